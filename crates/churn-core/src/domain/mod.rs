//! Domain models for the churn lifecycle.
//!
//! Canonical definitions for the core entities:
//! - `FeatureRecord` / `Dataset` / `EncodedTable`: training and serving data
//! - `CategoricalEncoder`: fitted categorical-to-index mapping
//! - `Estimator`: the black-box binary classifier
//! - `TrainedPipeline`: encoder + estimator, the unit that gets versioned
//! - `ClassificationMetrics`: holdout scores used for promotion decisions

pub mod encoder;
pub mod error;
pub mod estimator;
pub mod feature;
pub mod metrics;
pub mod pipeline;

pub use encoder::{CategoricalEncoder, Transformed, UNSEEN_INDEX};
pub use error::{ChurnError, EncoderError, Result, Stage, StageContext};
pub use estimator::{
    BinaryClassifier, Estimator, LogisticParams, LogisticRegression, DECISION_THRESHOLD,
};
pub use feature::{CustomerProfile, Dataset, EncodedTable, FeatureRecord, FeatureValue};
pub use metrics::{ClassificationMetrics, TargetMetric};
pub use pipeline::{Scored, TrainedPipeline};
