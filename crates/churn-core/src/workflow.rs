//! End-to-end training pipeline: ingest, prepare, train, evaluate.
//!
//! Each stage persists its output under `paths.artifacts_root` exactly as
//! the individual CLI commands do, so a run can be resumed stage by stage.

use serde::Serialize;
use tracing::info;

use churn_state::RunId;

use crate::config::ChurnConfig;
use crate::domain::{Result, Stage, StageContext};
use crate::evaluate::{EvaluationPolicy, EvaluationReport, Evaluator};
use crate::ingest::{ingest, DocumentSource, JsonLinesSource};
use crate::prepare::prepare_to_disk;
use crate::stores::LifecycleStores;
use crate::train::{train, write_run_id};

#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub records: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub run_id: RunId,
    pub evaluation: EvaluationReport,
}

/// Run every stage against the configured raw data export.
pub async fn run_pipeline(stores: &LifecycleStores, config: &ChurnConfig) -> Result<PipelineSummary> {
    let source = JsonLinesSource::new(&config.paths.raw_data);
    run_pipeline_from(stores, config, &source).await
}

/// Run every stage, pulling documents from `source`.
pub async fn run_pipeline_from(
    stores: &LifecycleStores,
    config: &ChurnConfig,
    source: &dyn DocumentSource,
) -> Result<PipelineSummary> {
    let model = config.model.name.as_str();
    let paths = &config.paths;

    let dataset = ingest(source, &paths.dataset())
        .await
        .stage(Stage::Ingest, model)?;
    let prepared = prepare_to_disk(paths, &config.training).stage(Stage::Prepare, model)?;

    let trained = train(stores, config, prepared.encoder, &prepared.train).await?;
    let run_id = trained.run.run_id;
    write_run_id(paths, &run_id).stage(Stage::Train, model)?;

    let evaluator = Evaluator::new(stores.clone(), EvaluationPolicy::from(config));
    let evaluation = evaluator.evaluate(&run_id, &prepared.test).await?;

    info!(
        run_id = %run_id,
        staged = ?evaluation.staged_version(),
        "pipeline finished"
    );
    Ok(PipelineSummary {
        records: dataset.len(),
        train_rows: prepared.train.len(),
        test_rows: prepared.test.len(),
        run_id,
        evaluation,
    })
}
