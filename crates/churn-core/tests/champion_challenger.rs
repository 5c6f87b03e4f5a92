use churn_core::evaluate::{EvaluationOutcome, EvaluationPolicy, Evaluator, IncumbentScore};
use churn_core::{
    CategoricalEncoder, ChurnError, EncodedTable, LifecycleStores, LogisticRegression, RunId,
    Stage, TargetMetric, TrainedPipeline, VersionStatus,
};
use churn_state::NewRun;

const MODEL: &str = "churn-classifier";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// tenure 0..9, churn when tenure >= 5.
fn holdout() -> EncodedTable {
    EncodedTable {
        columns: vec!["tenure".into(), "churn".into()],
        rows: (0..10)
            .map(|i| vec![i as f64, if i >= 5 { 1.0 } else { 0.0 }])
            .collect(),
    }
}

/// Threshold at 4.5 scores F1 = 1.0 on the holdout; 6.5 scores F1 = 0.75.
fn pipeline(intercept: f64) -> TrainedPipeline {
    let mut encoder = CategoricalEncoder::new();
    encoder.fit(&[]).expect("fit empty encoder");
    TrainedPipeline::new(
        encoder,
        vec!["tenure".into()],
        LogisticRegression::from_parameters(vec![1.0], intercept).into(),
    )
    .expect("pipeline")
}

async fn record_run(stores: &LifecycleStores, pipeline: &TrainedPipeline) -> RunId {
    let artifact = stores
        .artifacts
        .put(&pipeline.to_bytes().expect("serialize"))
        .await
        .expect("put artifact");
    stores
        .runs
        .create_run(NewRun {
            experiment: "churn-training".into(),
            params: serde_json::json!({}),
            artifact,
        })
        .await
        .expect("create run")
        .run_id
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

fn policy() -> EvaluationPolicy {
    EvaluationPolicy {
        model_name: MODEL.into(),
        target_metric: TargetMetric::F1Score,
        staging_alias: "staging".into(),
        production_alias: "production".into(),
    }
}

/// Register `pipeline` and bind it to production directly.
async fn install_production(stores: &LifecycleStores, pipeline: &TrainedPipeline) -> u64 {
    let run_id = record_run(stores, pipeline).await;
    let run = stores.runs.get_run(&run_id).await.expect("get run");
    let version = stores
        .registry
        .register(MODEL, &run.artifact, Some(&run_id))
        .await
        .expect("register");
    stores
        .registry
        .set_alias(MODEL, "production", version.version)
        .await
        .expect("bind production");
    version.version
}

// ---------------------------------------------------------------------------
// Decision rule
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bootstrap_stages_first_candidate() {
    let stores = LifecycleStores::in_memory();
    let run_id = record_run(&stores, &pipeline(-6.5)).await;

    let report = Evaluator::new(stores.clone(), policy())
        .evaluate(&run_id, &holdout())
        .await
        .expect("evaluate");

    assert!(!report.incumbent.is_available());
    assert_eq!(report.incumbent.score(), 0.0);
    assert_eq!(
        report.outcome,
        EvaluationOutcome::Staged {
            version: 1,
            previous_staging: None
        }
    );
    let staged = stores
        .registry
        .resolve_alias(MODEL, "staging")
        .await
        .expect("resolve")
        .expect("staging bound");
    assert_eq!(staged.version, 1);
    assert_eq!(staged.run_id.as_ref(), Some(&run_id));
}

#[tokio::test]
async fn better_candidate_is_staged_as_next_version() {
    let stores = LifecycleStores::in_memory();
    let production = install_production(&stores, &pipeline(-6.5)).await;
    let run_id = record_run(&stores, &pipeline(-4.5)).await;

    let report = Evaluator::new(stores.clone(), policy())
        .evaluate(&run_id, &holdout())
        .await
        .expect("evaluate");

    assert_eq!(report.incumbent.version(), Some(production));
    assert_close(report.incumbent.score(), 0.75);
    assert_eq!(report.candidate_score, 1.0);
    assert_eq!(report.staged_version(), Some(production + 1));

    // Production is untouched until promotion.
    let current = stores
        .registry
        .resolve_alias(MODEL, "production")
        .await
        .expect("resolve")
        .expect("production bound");
    assert_eq!(current.version, production);
}

#[tokio::test]
async fn tie_does_not_register() {
    let stores = LifecycleStores::in_memory();
    install_production(&stores, &pipeline(-4.5)).await;
    let run_id = record_run(&stores, &pipeline(-4.5)).await;

    let report = Evaluator::new(stores.clone(), policy())
        .evaluate(&run_id, &holdout())
        .await
        .expect("evaluate");

    assert_eq!(report.outcome, EvaluationOutcome::Discarded);
    let versions = stores.registry.list_versions(MODEL).await.expect("list");
    assert_eq!(versions.len(), 1);
    assert!(stores
        .registry
        .resolve_alias(MODEL, "staging")
        .await
        .expect("resolve")
        .is_none());
}

#[tokio::test]
async fn worse_candidate_is_discarded_but_metrics_are_logged() {
    let stores = LifecycleStores::in_memory();
    install_production(&stores, &pipeline(-4.5)).await;
    let run_id = record_run(&stores, &pipeline(-6.5)).await;

    let report = Evaluator::new(stores.clone(), policy())
        .evaluate(&run_id, &holdout())
        .await
        .expect("evaluate");

    assert_eq!(report.outcome, EvaluationOutcome::Discarded);
    let logged = stores.runs.get_metrics(&run_id).await.expect("metrics");
    assert_close(logged["f1_score"], 0.75);
    assert_close(logged["accuracy"], 0.8);
}

#[tokio::test]
async fn accuracy_target_metric_is_respected() {
    let stores = LifecycleStores::in_memory();
    install_production(&stores, &pipeline(-6.5)).await;
    let run_id = record_run(&stores, &pipeline(-4.5)).await;

    let policy = EvaluationPolicy {
        target_metric: TargetMetric::Accuracy,
        ..policy()
    };
    let report = Evaluator::new(stores.clone(), policy)
        .evaluate(&run_id, &holdout())
        .await
        .expect("evaluate");

    assert_eq!(report.target_metric, TargetMetric::Accuracy);
    assert_close(report.incumbent.score(), 0.8);
    assert_eq!(report.candidate_score, 1.0);
    assert!(report.staged_version().is_some());
}

// ---------------------------------------------------------------------------
// Incumbent failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn incumbent_with_wrong_columns_counts_as_unavailable() {
    let stores = LifecycleStores::in_memory();
    let mut encoder = CategoricalEncoder::new();
    encoder.fit(&[]).expect("fit");
    let mismatched = TrainedPipeline::new(
        encoder,
        vec!["tenure".into(), "support_calls".into()],
        LogisticRegression::from_parameters(vec![1.0, 1.0], 0.0).into(),
    )
    .expect("pipeline");
    install_production(&stores, &mismatched).await;
    let run_id = record_run(&stores, &pipeline(-6.5)).await;

    let report = Evaluator::new(stores.clone(), policy())
        .evaluate(&run_id, &holdout())
        .await
        .expect("evaluate");

    match &report.incumbent {
        IncumbentScore::Unavailable { reason } => assert!(reason.contains("columns")),
        other => panic!("expected unavailable incumbent, got {other:?}"),
    }
    assert_eq!(report.staged_version(), Some(2));
}

#[tokio::test]
async fn restaging_archives_previous_staging_version() {
    let stores = LifecycleStores::in_memory();
    let first = record_run(&stores, &pipeline(-6.5)).await;
    let evaluator = Evaluator::new(stores.clone(), policy());
    evaluator.evaluate(&first, &holdout()).await.expect("first");

    let second = record_run(&stores, &pipeline(-4.5)).await;
    let report = evaluator.evaluate(&second, &holdout()).await.expect("second");

    assert_eq!(
        report.outcome,
        EvaluationOutcome::Staged {
            version: 2,
            previous_staging: Some(1)
        }
    );
    let v1 = stores.registry.get_version(MODEL, 1).await.expect("v1");
    assert_eq!(v1.status, VersionStatus::Archived);
}

// ---------------------------------------------------------------------------
// Candidate failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_run_fails_in_evaluate_stage() {
    let stores = LifecycleStores::in_memory();
    let err = Evaluator::new(stores.clone(), policy())
        .evaluate(&RunId::new(), &holdout())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ChurnError::Stage {
            stage: Stage::Evaluate,
            ..
        }
    ));
    assert!(err.to_string().contains(MODEL));
    assert!(stores.registry.list_versions(MODEL).await.expect("list").is_empty());
}

#[tokio::test]
async fn non_binary_labels_leave_registry_untouched() {
    let stores = LifecycleStores::in_memory();
    let run_id = record_run(&stores, &pipeline(-4.5)).await;
    let mut bad = holdout();
    bad.rows[3][1] = 2.0;

    let err = Evaluator::new(stores.clone(), policy())
        .evaluate(&run_id, &bad)
        .await
        .unwrap_err();

    assert!(matches!(err.root(), ChurnError::InvalidLabel { .. }));
    assert!(stores.registry.list_versions(MODEL).await.expect("list").is_empty());
}
