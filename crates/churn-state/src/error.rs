//! Error types for churn-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the backing database.
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by the storage traits (`ArtifactStore`, `RunTracker`,
/// `ModelRegistry`) regardless of backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("artifact not found: {digest}")]
    NotFound { digest: String },

    #[error("invalid content digest: {digest}")]
    InvalidDigest { digest: String },

    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("version {version} of model '{name}' not found")]
    VersionNotFound { name: String, version: u64 },

    #[error(
        "alias '{alias}' of model '{name}' changed concurrently: expected {}, found {}",
        fmt_binding(.expected),
        fmt_binding(.actual)
    )]
    AliasConflict {
        name: String,
        alias: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("alias '{alias}' of model '{name}' has no previous binding")]
    NoPreviousBinding { name: String, alias: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

fn fmt_binding(version: &Option<u64>) -> String {
    match version {
        Some(v) => format!("v{v}"),
        None => "unbound".to_string(),
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_conflict_names_both_bindings() {
        let err = StorageError::AliasConflict {
            name: "churn".to_string(),
            alias: "production".to_string(),
            expected: Some(3),
            actual: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected v3"));
        assert!(msg.contains("found unbound"));
    }

    #[test]
    fn version_not_found_mentions_model() {
        let err = StorageError::VersionNotFound {
            name: "churn".to_string(),
            version: 7,
        };
        assert_eq!(err.to_string(), "version 7 of model 'churn' not found");
    }
}
