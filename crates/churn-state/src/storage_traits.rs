//! Storage trait definitions for the churn model lifecycle
//!
//! These traits define the core storage abstractions:
//! - `ArtifactStore`: Content-addressed artifact storage (put/get by digest)
//! - `RunTracker`: Training runs and their append-only metric log
//! - `ModelRegistry`: Versioned models and alias bindings (promotion state)
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ArtifactStore - Content-Addressed Storage
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl From<ContentDigest> for String {
    fn from(digest: ContentDigest) -> Self {
        digest.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content-addressed artifact store.
///
/// Guarantees:
/// - `put(data)` always returns the SHA-256 digest of `data`.
/// - `get(digest)` returns the exact bytes previously stored.
/// - Same content always yields the same digest (deduplication).
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store bytes and return their content digest.
    async fn put(&self, data: &[u8]) -> StorageResult<ContentDigest>;

    /// Retrieve bytes by digest. Returns `StorageError::NotFound` if absent.
    async fn get(&self, digest: &ContentDigest) -> StorageResult<Vec<u8>>;

    /// Check whether a digest exists in the store.
    async fn contains(&self, digest: &ContentDigest) -> StorageResult<bool>;
}

// ---------------------------------------------------------------------------
// RunTracker - Training Runs
// ---------------------------------------------------------------------------

/// Unique identifier for a training run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random RunId
    pub fn new() -> Self {
        RunId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Input for creating a run. Everything a run carries is fixed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRun {
    /// Experiment the run belongs to
    pub experiment: String,
    /// Training hyper-parameters
    pub params: serde_json::Value,
    /// The trained pipeline artifact produced by the run
    pub artifact: ContentDigest,
}

/// Immutable run record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub experiment: String,
    pub params: serde_json::Value,
    pub artifact: ContentDigest,
    pub created_at: DateTime<Utc>,
}

/// Training run tracker.
///
/// Guarantees:
/// - A run record is written once and never mutated.
/// - Metrics are appended; reading returns the latest value per metric name.
#[async_trait]
pub trait RunTracker: Send + Sync {
    /// Create a new run, returning the stored record.
    async fn create_run(&self, run: NewRun) -> StorageResult<RunRecord>;

    /// Append metric values to a run. Fails with `RunNotFound` for unknown runs.
    async fn log_metrics(&self, run_id: &RunId, metrics: &BTreeMap<String, f64>)
        -> StorageResult<()>;

    /// Retrieve a run record by ID.
    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord>;

    /// Latest logged value of every metric for a run.
    async fn get_metrics(&self, run_id: &RunId) -> StorageResult<BTreeMap<String, f64>>;

    /// List runs, optionally filtered by experiment (oldest first).
    async fn list_runs(&self, experiment: Option<&str>) -> StorageResult<Vec<RunRecord>>;
}

// ---------------------------------------------------------------------------
// ModelRegistry - Versions and Aliases
// ---------------------------------------------------------------------------

/// Lifecycle status of a registered version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Active,
    Archived,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Active => "active",
            VersionStatus::Archived => "archived",
        }
    }
}

impl std::str::FromStr for VersionStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(VersionStatus::Active),
            "archived" => Ok(VersionStatus::Archived),
            other => Err(StorageError::Backend(format!(
                "unknown version status: {other}"
            ))),
        }
    }
}

/// An immutable, numbered snapshot of one trained artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub model_name: String,
    pub version: u64,
    pub artifact: ContentDigest,
    pub run_id: Option<RunId>,
    pub status: VersionStatus,
    pub created_at: DateTime<Utc>,
}

/// Current binding of one alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasBinding {
    pub model_name: String,
    pub alias: String,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// One entry of an alias's rebinding history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasEvent {
    pub model_name: String,
    pub alias: String,
    pub version: u64,
    pub previous: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Versioned model registry with named aliases.
///
/// Semantics:
/// - `register` appends a new version numbered one past the highest existing
///   version for the model (starting at 1). Versions are never deleted.
/// - Rebinding an alias archives the version it previously pointed to,
///   unless another alias of the same model still references it, and marks
///   the newly bound version active.
/// - Alias updates are atomic: readers never see a binding to a missing
///   version or a half-applied rebind.
/// - `alias_history` returns rebinds newest first.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Register a new version bound to `artifact`.
    async fn register(
        &self,
        model_name: &str,
        artifact: &ContentDigest,
        run_id: Option<&RunId>,
    ) -> StorageResult<ModelVersion>;

    /// Fetch one version. Fails with `VersionNotFound` if absent.
    async fn get_version(&self, model_name: &str, version: u64) -> StorageResult<ModelVersion>;

    /// All versions of a model, ascending.
    async fn list_versions(&self, model_name: &str) -> StorageResult<Vec<ModelVersion>>;

    /// Bind `alias` to `version` unconditionally, returning the previous binding.
    /// Rebinding to the current version is a no-op and leaves no history.
    /// An unknown model or version fails with `VersionNotFound`.
    async fn set_alias(
        &self,
        model_name: &str,
        alias: &str,
        version: u64,
    ) -> StorageResult<Option<u64>>;

    /// Bind `alias` to `version` only if it is currently bound to `expected`
    /// (`None` meaning unbound). Fails with `AliasConflict` otherwise.
    async fn compare_and_set_alias(
        &self,
        model_name: &str,
        alias: &str,
        expected: Option<u64>,
        version: u64,
    ) -> StorageResult<Option<u64>>;

    /// Resolve an alias to the version it points at, if bound.
    async fn resolve_alias(&self, model_name: &str, alias: &str)
        -> StorageResult<Option<ModelVersion>>;

    /// Current bindings of every alias of a model, ordered by alias name.
    async fn list_aliases(&self, model_name: &str) -> StorageResult<Vec<AliasBinding>>;

    /// Rebinding history of an alias (newest first).
    async fn alias_history(&self, model_name: &str, alias: &str)
        -> StorageResult<Vec<AliasEvent>>;
}
