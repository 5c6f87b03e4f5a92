//! Churn Model Lifecycle Core Library
//!
//! Encoding, training, champion/challenger evaluation, alias promotion and
//! serving-side resolution for the churn classifier.

pub mod config;
pub mod domain;
pub mod evaluate;
pub mod gate;
pub mod ingest;
pub mod metrics;
pub mod obs;
pub mod prepare;
pub mod promote;
pub mod reporting;
pub mod serving;
pub mod stores;
pub mod telemetry;
pub mod train;
pub mod workflow;

pub use config::{
    ChurnConfig, ConfigError, DeploymentConfig, ModelConfig, PathsConfig, RegistryConfig,
    TrainingConfig,
};

pub use domain::{
    BinaryClassifier, CategoricalEncoder, ChurnError, ClassificationMetrics, CustomerProfile,
    Dataset, EncodedTable, EncoderError, Estimator, FeatureRecord, FeatureValue, LogisticParams,
    LogisticRegression, Result, Stage, StageContext, TargetMetric, TrainedPipeline, Transformed,
    UNSEEN_INDEX,
};

pub use churn_state::{
    AliasBinding, AliasEvent, ContentDigest, ModelVersion, RunId, StorageError, VersionStatus,
};

pub use evaluate::{
    candidate_wins, EvaluationOutcome, EvaluationPolicy, EvaluationReport, Evaluator,
    IncumbentScore,
};
pub use gate::{check_version, evaluate_gate, GateRule, GateVerdict, QualityGate, Violation};
pub use ingest::{ingest, DocumentSource, JsonLinesSource};
pub use prepare::{prepare, prepare_to_disk, PreparedData};
pub use promote::{
    promote, rollback, GateCheck, PromotionOutcome, PromotionRequest, RollbackOutcome,
};
pub use serving::{ChurnLabel, Prediction, PredictionService, ServeError};
pub use stores::LifecycleStores;
pub use train::{read_run_id, train, train_from_disk, write_run_id, TrainOutcome};
pub use workflow::{run_pipeline, run_pipeline_from, PipelineSummary};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
