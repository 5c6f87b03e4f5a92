//! churnctl - churn model lifecycle CLI
//!
//! Runs each stage of the training pipeline and operates the model
//! registry.
//!
//! ## Commands
//!
//! - `ingest` / `prepare` / `train` / `evaluate`: individual pipeline stages
//! - `pipeline`: all four stages in sequence
//! - `promote`: move the staging alias to production
//! - `gate`: score the staged version against the quality thresholds
//! - `alias`, `versions`, `runs`: registry inspection and rollback
//! - `predict`: score one customer profile with the production model

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use churn_core::evaluate::{EvaluationPolicy, Evaluator};
use churn_core::ingest::{ingest, JsonLinesSource};
use churn_core::metrics::METRICS;
use churn_core::promote::{promote, rollback, GateCheck, PromotionOutcome, PromotionRequest};
use churn_core::reporting::{
    describe_promotion, render_evaluation_summary_md, write_evaluation_report_json,
    write_metrics_json,
};
use churn_core::serving::PredictionService;
use churn_core::{
    check_version, prepare_to_disk, read_run_id, run_pipeline, train_from_disk, ChurnConfig,
    CustomerProfile, EncodedTable, LifecycleStores, QualityGate, RunId,
};

#[derive(Parser)]
#[command(name = "churnctl")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Churn model lifecycle: train, evaluate, promote, serve", long_about = None)]
struct Cli {
    /// Path to the lifecycle configuration file
    #[arg(short, long, global = true, env = "CHURN_CONFIG", default_value = "churn.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the configuration file and print the resolved settings
    Validate,

    /// Pull customer documents into the dataset artifact
    Ingest {
        /// JSON Lines export to read (default: paths.raw_data)
        #[arg(short, long)]
        source: Option<PathBuf>,
    },

    /// Fill, encode and split the ingested dataset
    Prepare,

    /// Fit the estimator and record a training run
    Train,

    /// Score a run against production and stage it if it wins
    Evaluate {
        /// Run to evaluate (default: the run id left by `train`)
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Run ingest, prepare, train and evaluate in sequence
    Pipeline,

    /// Move the staging alias to production
    Promote {
        /// Apply the quality gate before moving the alias
        #[arg(long)]
        require_gate: bool,
    },

    /// Check the staged version against the quality thresholds
    Gate,

    /// Inspect or roll back aliases
    Alias {
        #[command(subcommand)]
        action: AliasAction,
    },

    /// List registered versions
    Versions,

    /// List training runs
    Runs {
        /// Only runs of this experiment
        #[arg(long)]
        experiment: Option<String>,
    },

    /// Score one customer profile with the production model
    Predict {
        /// Profile JSON file; reads stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AliasAction {
    /// Show every alias binding
    List,
    /// Show the version an alias points at
    Current {
        /// Alias name (default: deployment.target_alias)
        alias: Option<String>,
    },
    /// Show the rebinding history of an alias, newest first
    History {
        /// Alias name (default: deployment.target_alias)
        alias: Option<String>,
    },
    /// Rebind an alias to its previous version
    Rollback {
        /// Alias name (default: deployment.target_alias)
        alias: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    churn_core::telemetry::init_tracing(cli.json, level);

    let config = ChurnConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

    if let Commands::Validate = cli.command {
        return cmd_validate(&config);
    }

    let stores = LifecycleStores::open(&config)
        .await
        .context("Failed to open lifecycle stores")?;

    let result = match cli.command {
        Commands::Validate => Ok(()),
        Commands::Ingest { source } => cmd_ingest(&config, source.as_deref()).await,
        Commands::Prepare => cmd_prepare(&config),
        Commands::Train => cmd_train(&stores, &config).await,
        Commands::Evaluate { run_id } => cmd_evaluate(&stores, &config, run_id).await,
        Commands::Pipeline => cmd_pipeline(&stores, &config).await,
        Commands::Promote { require_gate } => cmd_promote(&stores, &config, require_gate).await,
        Commands::Gate => cmd_gate(&stores, &config).await,
        Commands::Alias { action } => match action {
            AliasAction::List => cmd_alias_list(&stores, &config).await,
            AliasAction::Current { alias } => {
                cmd_alias_current(&stores, &config, alias.as_deref()).await
            }
            AliasAction::History { alias } => {
                cmd_alias_history(&stores, &config, alias.as_deref()).await
            }
            AliasAction::Rollback { alias } => {
                cmd_alias_rollback(&stores, &config, alias.as_deref()).await
            }
        },
        Commands::Versions => cmd_versions(&stores, &config).await,
        Commands::Runs { experiment } => cmd_runs(&stores, experiment.as_deref()).await,
        Commands::Predict { input } => cmd_predict(&stores, &config, input.as_deref()).await,
    };

    METRICS.flush();
    result
}

fn cmd_validate(config: &ChurnConfig) -> Result<()> {
    println!("Configuration OK");
    println!("Model:          {}", config.model.name);
    println!("Target metric:  {}", config.model.target_metric);
    println!(
        "Aliases:        {} -> {}",
        config.deployment.source_alias, config.deployment.target_alias
    );
    println!(
        "Quality gate:   accuracy >= {}, f1 >= {}",
        config.deployment.min_accuracy, config.deployment.min_f1
    );
    println!("Artifacts:      {:?}", config.paths.artifacts_root);
    match &config.registry.url {
        Some(url) => println!("Registry:       {}", url),
        None => println!("Registry:       from environment, else in-memory"),
    }
    Ok(())
}

async fn cmd_ingest(config: &ChurnConfig, source: Option<&Path>) -> Result<()> {
    let path = source.unwrap_or(config.paths.raw_data.as_path());
    let dataset = ingest(&JsonLinesSource::new(path), &config.paths.dataset())
        .await
        .with_context(|| format!("ingest {:?}", path))?;
    println!(
        "Ingested {} records ({} columns) -> {:?}",
        dataset.len(),
        dataset.columns.len(),
        config.paths.dataset()
    );
    Ok(())
}

fn cmd_prepare(config: &ChurnConfig) -> Result<()> {
    let prepared = prepare_to_disk(&config.paths, &config.training).context("prepare data")?;
    println!(
        "Prepared {} train / {} test rows, {} features",
        prepared.train.len(),
        prepared.test.len(),
        prepared.train.feature_columns().len()
    );
    Ok(())
}

async fn cmd_train(stores: &LifecycleStores, config: &ChurnConfig) -> Result<()> {
    let outcome = train_from_disk(stores, config).await?;
    println!("Run:      {}", outcome.run.run_id);
    println!("Artifact: {}", outcome.artifact);
    Ok(())
}

async fn cmd_evaluate(
    stores: &LifecycleStores,
    config: &ChurnConfig,
    run_id: Option<String>,
) -> Result<()> {
    let run_id = match run_id {
        Some(id) => RunId(id),
        None => read_run_id(&config.paths.run_id_file())
            .context("No --run-id given and no run id left by `train`")?,
    };
    let holdout = EncodedTable::load(&config.paths.test_table()).context("load test table")?;

    let evaluator = Evaluator::new(stores.clone(), EvaluationPolicy::from(config));
    let report = evaluator.evaluate(&run_id, &holdout).await?;

    write_metrics_json(&config.paths.metrics_file(), &report.metrics)?;
    write_evaluation_report_json(&config.paths.evaluation_file(), &report)?;
    print!("{}", render_evaluation_summary_md(&report));
    Ok(())
}

async fn cmd_pipeline(stores: &LifecycleStores, config: &ChurnConfig) -> Result<()> {
    let summary = run_pipeline(stores, config).await?;
    write_metrics_json(&config.paths.metrics_file(), &summary.evaluation.metrics)?;
    write_evaluation_report_json(&config.paths.evaluation_file(), &summary.evaluation)?;
    println!(
        "Ingested {} records, trained on {} rows, evaluated on {}",
        summary.records, summary.train_rows, summary.test_rows
    );
    print!("{}", render_evaluation_summary_md(&summary.evaluation));
    Ok(())
}

async fn cmd_promote(
    stores: &LifecycleStores,
    config: &ChurnConfig,
    require_gate: bool,
) -> Result<()> {
    let request = PromotionRequest::from(config);
    let gate = QualityGate::from_deployment(&config.deployment);
    let holdout = if require_gate {
        Some(EncodedTable::load(&config.paths.test_table()).context("load test table for gate")?)
    } else {
        None
    };
    let check = holdout.as_ref().map(|holdout| GateCheck {
        gate: &gate,
        holdout,
    });

    let outcome = promote(stores, &request, check).await?;
    println!("{}", describe_promotion(&request.model_name, &outcome));
    if let PromotionOutcome::Rejected { version, .. } = outcome {
        bail!("version {} failed the quality gate", version);
    }
    Ok(())
}

async fn cmd_gate(stores: &LifecycleStores, config: &ChurnConfig) -> Result<()> {
    let model = &config.model.name;
    let alias = &config.deployment.source_alias;
    let Some(version) = stores.registry.resolve_alias(model, alias).await? else {
        bail!("No version of {} is bound to '{}'", model, alias);
    };
    let holdout = EncodedTable::load(&config.paths.test_table()).context("load test table")?;
    let gate = QualityGate::from_deployment(&config.deployment);

    let verdict = check_version(stores, &gate, &version, &holdout).await?;
    println!(
        "{} v{}: accuracy {:.4}, f1 {:.4}",
        model, version.version, verdict.metrics.accuracy, verdict.metrics.f1_score
    );
    if !verdict.passed() {
        for violation in &verdict.violations {
            println!("  FAIL {}", violation.reason);
        }
        bail!("Quality gate failed for {} v{}", model, version.version);
    }
    println!("Quality gate passed");
    Ok(())
}

async fn cmd_alias_list(stores: &LifecycleStores, config: &ChurnConfig) -> Result<()> {
    let bindings = stores.registry.list_aliases(&config.model.name).await?;
    if bindings.is_empty() {
        println!("No aliases set for {}", config.model.name);
        return Ok(());
    }
    for binding in bindings {
        println!(
            "{:<12} v{:<4} {}",
            binding.alias,
            binding.version,
            binding.updated_at.to_rfc3339()
        );
    }
    Ok(())
}

async fn cmd_alias_current(
    stores: &LifecycleStores,
    config: &ChurnConfig,
    alias: Option<&str>,
) -> Result<()> {
    let model = &config.model.name;
    let alias = alias.unwrap_or(&config.deployment.target_alias);
    match stores.registry.resolve_alias(model, alias).await? {
        Some(version) => println!(
            "{}@{} -> v{} ({}, artifact {})",
            model,
            alias,
            version.version,
            version.status.as_str(),
            version.artifact.short()
        ),
        None => println!("{}@{} is not bound", model, alias),
    }
    Ok(())
}

async fn cmd_alias_history(
    stores: &LifecycleStores,
    config: &ChurnConfig,
    alias: Option<&str>,
) -> Result<()> {
    let model = &config.model.name;
    let alias = alias.unwrap_or(&config.deployment.target_alias);
    let history = stores.registry.alias_history(model, alias).await?;
    if history.is_empty() {
        println!("No history for {}@{}", model, alias);
        return Ok(());
    }
    for event in history {
        let previous = event
            .previous
            .map(|v| format!("v{}", v))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {} -> v{}",
            event.created_at.to_rfc3339(),
            previous,
            event.version
        );
    }
    Ok(())
}

async fn cmd_alias_rollback(
    stores: &LifecycleStores,
    config: &ChurnConfig,
    alias: Option<&str>,
) -> Result<()> {
    let model = &config.model.name;
    let alias = alias.unwrap_or(&config.deployment.target_alias);
    let outcome = rollback(stores, model, alias).await?;
    println!(
        "Rolled back {}@{}: v{} -> v{}",
        model, outcome.alias, outcome.from, outcome.to
    );
    Ok(())
}

async fn cmd_versions(stores: &LifecycleStores, config: &ChurnConfig) -> Result<()> {
    let versions = stores.registry.list_versions(&config.model.name).await?;
    if versions.is_empty() {
        println!("No versions registered for {}", config.model.name);
        return Ok(());
    }
    for version in versions {
        let run = version
            .run_id
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "v{:<4} {:<8} {} run {}",
            version.version,
            version.status.as_str(),
            version.created_at.to_rfc3339(),
            run
        );
    }
    Ok(())
}

async fn cmd_runs(stores: &LifecycleStores, experiment: Option<&str>) -> Result<()> {
    let runs = stores.runs.list_runs(experiment).await?;
    if runs.is_empty() {
        println!("No runs recorded");
        return Ok(());
    }
    for run in runs {
        let metrics = stores.runs.get_metrics(&run.run_id).await?;
        let f1 = metrics
            .get("f1_score")
            .map(|v| format!("{:.4}", v))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {} {} f1={}",
            run.run_id,
            run.experiment,
            run.created_at.to_rfc3339(),
            f1
        );
    }
    Ok(())
}

async fn cmd_predict(
    stores: &LifecycleStores,
    config: &ChurnConfig,
    input: Option<&Path>,
) -> Result<()> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?,
        None => std::io::read_to_string(std::io::stdin()).context("read profile from stdin")?,
    };
    let profile: CustomerProfile = serde_json::from_str(&raw).context("parse customer profile")?;

    let service = PredictionService::from_config(stores, config);
    let prediction = service.predict(profile).await?;
    info!(version = prediction.model_version, "prediction served");
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use churn_core::{CategoricalEncoder, LogisticRegression, TrainedPipeline};
    use churn_state::NewRun;

    const CONFIG: &str = r#"
        [model]
        name = "churn-classifier"
        target_metric = "f1_score"

        [deployment]
        source_alias = "staging"
        target_alias = "production"
        min_accuracy = 0.9
        min_f1 = 0.9
    "#;

    fn config(root: &Path) -> ChurnConfig {
        let mut config = ChurnConfig::from_toml_str(CONFIG).unwrap();
        config.paths.artifacts_root = root.to_path_buf();
        config
    }

    /// Stage a pipeline that scores F1 = 0.75 on the saved holdout.
    async fn stage_weak_model(stores: &LifecycleStores, config: &ChurnConfig) {
        let holdout = EncodedTable {
            columns: vec!["tenure".into(), "churn".into()],
            rows: (0..10)
                .map(|i| vec![i as f64, if i >= 5 { 1.0 } else { 0.0 }])
                .collect(),
        };
        holdout.save(&config.paths.test_table()).unwrap();

        let mut encoder = CategoricalEncoder::new();
        encoder.fit(&[]).unwrap();
        let pipeline = TrainedPipeline::new(
            encoder,
            vec!["tenure".into()],
            LogisticRegression::from_parameters(vec![1.0], -6.5).into(),
        )
        .unwrap();
        let artifact = stores.artifacts.put(&pipeline.to_bytes().unwrap()).await.unwrap();
        let run = stores
            .runs
            .create_run(NewRun {
                experiment: "churn-training".into(),
                params: serde_json::json!({}),
                artifact,
            })
            .await
            .unwrap();
        Evaluator::new(stores.clone(), EvaluationPolicy::from(config))
            .evaluate(&run.run_id, &holdout)
            .await
            .unwrap();
    }

    #[test]
    fn cli_parses_promote_flags() {
        let cli = Cli::try_parse_from(["churnctl", "--config", "x.toml", "promote", "--require-gate"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        assert!(matches!(cli.command, Commands::Promote { require_gate: true }));
    }

    #[tokio::test]
    async fn promote_with_nothing_staged_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let stores = LifecycleStores::in_memory();
        cmd_promote(&stores, &config(dir.path()), false).await.unwrap();
    }

    #[tokio::test]
    async fn gate_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let stores = LifecycleStores::in_memory();
        stage_weak_model(&stores, &config).await;

        assert!(cmd_gate(&stores, &config).await.is_err());
        assert!(cmd_promote(&stores, &config, true).await.is_err());
        assert!(stores
            .registry
            .resolve_alias("churn-classifier", "production")
            .await
            .unwrap()
            .is_none());

        // Without the gate the same version promotes.
        cmd_promote(&stores, &config, false).await.unwrap();
        cmd_alias_rollback(&stores, &config, Some("staging"))
            .await
            .expect_err("staging has no previous binding");
    }

    #[tokio::test]
    async fn evaluate_without_run_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let stores = LifecycleStores::in_memory();
        let err = cmd_evaluate(&stores, &config, None).await.unwrap_err();
        assert!(err.to_string().contains("no run id"));
    }
}
