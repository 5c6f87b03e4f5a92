//! Explicitly constructed storage handles shared by every lifecycle stage.

use std::sync::Arc;

use churn_state::fakes::{MemoryArtifactStore, MemoryModelRegistry, MemoryRunTracker};
use churn_state::{
    ArtifactStore, FsArtifactStore, ModelRegistry, RunTracker, StorageError, SurrealHandle,
    SurrealModelRegistry, SurrealRunTracker,
};
use tracing::info;

use crate::config::ChurnConfig;
use crate::domain::Result;

/// Artifact store, run tracker and model registry, injected into the
/// trainer, evaluator, promotion workflow and prediction service.
#[derive(Clone)]
pub struct LifecycleStores {
    pub artifacts: Arc<dyn ArtifactStore>,
    pub runs: Arc<dyn RunTracker>,
    pub registry: Arc<dyn ModelRegistry>,
}

impl LifecycleStores {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        runs: Arc<dyn RunTracker>,
        registry: Arc<dyn ModelRegistry>,
    ) -> Self {
        Self {
            artifacts,
            runs,
            registry,
        }
    }

    /// Volatile stores; state lives as long as the returned value.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryArtifactStore::new()),
            Arc::new(MemoryRunTracker::new()),
            Arc::new(MemoryModelRegistry::new()),
        )
    }

    /// Filesystem artifact store under `paths.artifacts_root` plus the
    /// SurrealDB registry.
    ///
    /// Registry endpoint precedence: `SURREALDB_ENDPOINT` credentials,
    /// `SURREALDB_URL`, `registry.url` from the config, then in-memory.
    pub async fn open(config: &ChurnConfig) -> Result<Self> {
        let handle = SurrealHandle::setup_from_env(config.registry.url.as_deref())
            .await
            .map_err(StorageError::from)?;
        Self::with_handle(config, Arc::new(handle))
    }

    /// Filesystem artifact store plus a registry on an already connected
    /// handle. Ignores the environment.
    pub fn with_handle(config: &ChurnConfig, handle: Arc<SurrealHandle>) -> Result<Self> {
        let artifacts = FsArtifactStore::new(config.paths.store())?;

        info!(store = %config.paths.store().display(), "lifecycle stores opened");
        Ok(Self::new(
            Arc::new(artifacts),
            Arc::new(SurrealRunTracker::new(handle.clone())),
            Arc::new(SurrealModelRegistry::new(handle)),
        ))
    }
}
