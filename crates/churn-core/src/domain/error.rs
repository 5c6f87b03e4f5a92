//! Domain-level error taxonomy for the churn lifecycle.

use std::fmt;

use churn_state::StorageError;

use crate::config::ConfigError;

/// Lifecycle stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    Prepare,
    Train,
    Evaluate,
    Register,
    Promote,
    Gate,
    Rollback,
    Serve,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Prepare => "prepare",
            Stage::Train => "train",
            Stage::Evaluate => "evaluate",
            Stage::Register => "register",
            Stage::Promote => "promote",
            Stage::Gate => "gate",
            Stage::Rollback => "rollback",
            Stage::Serve => "serve",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the categorical encoder.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EncoderError {
    #[error("encoder is already fitted; fit may only be called once")]
    AlreadyFitted,

    #[error("encoder used before fit")]
    NotFitted,
}

/// Churn lifecycle domain errors.
#[derive(Debug, thiserror::Error)]
pub enum ChurnError {
    #[error("{stage} failed for model '{model}'{}: {source}", fmt_alias(.alias))]
    Stage {
        stage: Stage,
        model: String,
        /// Set for alias operations (promotion, rollback).
        alias: Option<String>,
        #[source]
        source: Box<ChurnError>,
    },

    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("feature count mismatch: model expects {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("invalid label {value} in row {row}: labels must be 0 or 1")]
    InvalidLabel { row: usize, value: f64 },

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChurnError {
    /// Wrap this error with the stage and model it occurred in.
    pub fn at(self, stage: Stage, model: &str) -> Self {
        ChurnError::Stage {
            stage,
            model: model.to_string(),
            alias: None,
            source: Box::new(self),
        }
    }

    /// Like [`ChurnError::at`], also naming the alias being moved.
    pub fn at_alias(self, stage: Stage, model: &str, alias: &str) -> Self {
        ChurnError::Stage {
            stage,
            model: model.to_string(),
            alias: Some(alias.to_string()),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any stage wrappers.
    pub fn root(&self) -> &ChurnError {
        match self {
            ChurnError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

fn fmt_alias(alias: &Option<String>) -> String {
    match alias {
        Some(alias) => format!(" (alias '{alias}')"),
        None => String::new(),
    }
}

/// Attach stage context to a fallible result.
pub trait StageContext<T> {
    fn stage(self, stage: Stage, model: &str) -> Result<T>;

    fn stage_alias(self, stage: Stage, model: &str, alias: &str) -> Result<T>;
}

impl<T, E> StageContext<T> for std::result::Result<T, E>
where
    E: Into<ChurnError>,
{
    fn stage(self, stage: Stage, model: &str) -> Result<T> {
        self.map_err(|e| e.into().at(stage, model))
    }

    fn stage_alias(self, stage: Stage, model: &str, alias: &str) -> Result<T> {
        self.map_err(|e| e.into().at_alias(stage, model, alias))
    }
}

/// Result type for churn domain operations.
pub type Result<T> = std::result::Result<T, ChurnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_wrapper_names_stage_and_model() {
        let err = ChurnError::ShapeMismatch {
            expected: 3,
            actual: 2,
        }
        .at(Stage::Evaluate, "churn-classifier");
        let msg = err.to_string();
        assert!(msg.starts_with("evaluate failed for model 'churn-classifier'"));
        assert!(msg.contains("model expects 3, got 2"));
    }

    #[test]
    fn root_skips_nested_stages() {
        let err = ChurnError::InvalidData("empty".to_string())
            .at(Stage::Prepare, "m")
            .at(Stage::Train, "m");
        assert!(matches!(err.root(), ChurnError::InvalidData(_)));
    }

    #[test]
    fn stage_context_converts_storage_errors() {
        let res: std::result::Result<(), StorageError> = Err(StorageError::RunNotFound {
            run_id: "r1".to_string(),
        });
        let err = res.stage(Stage::Evaluate, "m").unwrap_err();
        assert!(matches!(
            err.root(),
            ChurnError::Storage(StorageError::RunNotFound { .. })
        ));
    }

    #[test]
    fn alias_stage_names_the_alias() {
        let err = ChurnError::from(StorageError::NoPreviousBinding {
            name: "m".to_string(),
            alias: "production".to_string(),
        })
        .at_alias(Stage::Rollback, "m", "production");
        assert!(err
            .to_string()
            .starts_with("rollback failed for model 'm' (alias 'production'):"));
        match err {
            ChurnError::Stage { alias, .. } => assert_eq!(alias.as_deref(), Some("production")),
            other => panic!("expected Stage, got {other:?}"),
        }
    }
}
