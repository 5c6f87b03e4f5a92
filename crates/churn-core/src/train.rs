//! Training: fit the estimator, build the pipeline artifact, record the run.

use std::path::Path;

use churn_state::{ContentDigest, NewRun, RunId, RunRecord};
use tracing::info;

use crate::config::{ChurnConfig, PathsConfig};
use crate::domain::{
    CategoricalEncoder, ChurnError, EncodedTable, LogisticRegression, Result, Stage,
    StageContext, TrainedPipeline,
};
use crate::obs;
use crate::stores::LifecycleStores;

#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub run: RunRecord,
    pub artifact: ContentDigest,
    pub pipeline: TrainedPipeline,
}

/// Fit on `train`, store the pipeline artifact and create its run.
pub async fn train(
    stores: &LifecycleStores,
    config: &ChurnConfig,
    encoder: CategoricalEncoder,
    train: &EncodedTable,
) -> Result<TrainOutcome> {
    let model = config.model.name.as_str();
    let params = &config.training.estimator;

    let (x, y) = train.split_xy().stage(Stage::Train, model)?;
    let estimator = LogisticRegression::fit(&x, &y, params).stage(Stage::Train, model)?;
    let pipeline = TrainedPipeline::new(encoder, train.feature_columns().to_vec(), estimator.into())
        .stage(Stage::Train, model)?;

    let bytes = pipeline.to_bytes().stage(Stage::Train, model)?;
    let artifact = stores.artifacts.put(&bytes).await.stage(Stage::Train, model)?;

    let run = stores
        .runs
        .create_run(NewRun {
            experiment: config.training.experiment.clone(),
            params: serde_json::json!({
                "model_name": model,
                "estimator": "logistic",
                "learning_rate": params.learning_rate,
                "max_iter": params.max_iter,
                "alpha": params.alpha,
                "test_size": config.training.test_size,
                "random_seed": config.training.random_seed,
                "train_rows": train.len(),
            }),
            artifact: artifact.clone(),
        })
        .await
        .stage(Stage::Train, model)?;

    obs::emit_run_trained(&run.run_id.0, model, artifact.short());
    Ok(TrainOutcome {
        run,
        artifact,
        pipeline,
    })
}

/// Train from the prepared encoder and train table on disk, then leave the
/// run id where the evaluator picks it up.
pub async fn train_from_disk(stores: &LifecycleStores, config: &ChurnConfig) -> Result<TrainOutcome> {
    let model = config.model.name.as_str();
    let paths = &config.paths;

    let encoder_bytes = std::fs::read(paths.encoder()).stage(Stage::Train, model)?;
    let encoder: CategoricalEncoder =
        serde_json::from_slice(&encoder_bytes).stage(Stage::Train, model)?;
    let table = EncodedTable::load(&paths.train_table()).stage(Stage::Train, model)?;

    let outcome = train(stores, config, encoder, &table).await?;
    write_run_id(paths, &outcome.run.run_id).stage(Stage::Train, model)?;
    info!(
        run_id = %outcome.run.run_id,
        path = %paths.run_id_file().display(),
        "run id saved"
    );
    Ok(outcome)
}

pub fn write_run_id(paths: &PathsConfig, run_id: &RunId) -> Result<()> {
    let path = paths.run_id_file();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, &run_id.0)?;
    Ok(())
}

pub fn read_run_id(path: &Path) -> Result<RunId> {
    let raw = std::fs::read_to_string(path)?;
    let id = raw.trim();
    if id.is_empty() {
        return Err(ChurnError::InvalidData(format!(
            "run id file {} is empty",
            path.display()
        )));
    }
    Ok(RunId(id.to_string()))
}
