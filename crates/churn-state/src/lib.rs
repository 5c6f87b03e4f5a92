//! Churn-State: persistence layer for the churn model lifecycle
//!
//! This crate owns every piece of durable lifecycle state: trained pipeline
//! artifacts, training runs with their metrics, and the model registry
//! (numbered versions plus named aliases such as `staging` and
//! `production`).
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: data integrity and atomic alias rebinding.
//!
//! ## Key Components
//!
//! - `ArtifactStore`, `RunTracker`, `ModelRegistry`: backend-agnostic traits
//! - `fakes`: in-memory implementations for tests and ephemeral runs
//! - `FsArtifactStore`: content-addressed artifacts on the local filesystem
//! - `SurrealHandle`: SurrealDB connection backing the run tracker and registry

mod error;
pub mod fakes;
mod fs_store;
mod handle;
mod migrations;
pub mod storage_traits;
mod surreal_registry;

pub use error::{StateError, StorageError};
pub use fs_store::FsArtifactStore;
pub use handle::{CloudConfig, SurrealHandle};
pub use storage_traits::{
    AliasBinding, AliasEvent, ArtifactStore, ContentDigest, ModelRegistry, ModelVersion, NewRun,
    RunId, RunRecord, RunTracker, StorageResult, VersionStatus,
};
pub use surreal_registry::{SurrealModelRegistry, SurrealRunTracker};

/// Result type for churn-state connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
