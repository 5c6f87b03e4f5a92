use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::{
    AliasBinding, AliasEvent, ContentDigest, ModelRegistry, ModelVersion, NewRun, RunId,
    RunRecord, RunTracker, StorageResult,
};
use crate::SurrealHandle;

/// Unconditional rebinds retry their internal compare-and-set this many times.
const MAX_SET_ALIAS_ATTEMPTS: usize = 8;

/// SurrealDB-backed implementation of the ModelRegistry trait.
#[derive(Clone)]
pub struct SurrealModelRegistry {
    handle: Arc<SurrealHandle>,
}

impl SurrealModelRegistry {
    pub fn new(handle: Arc<SurrealHandle>) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl ModelRegistry for SurrealModelRegistry {
    async fn register(
        &self,
        model_name: &str,
        artifact: &ContentDigest,
        run_id: Option<&RunId>,
    ) -> StorageResult<ModelVersion> {
        self.handle
            .version_register(model_name, artifact, run_id)
            .await
    }

    async fn get_version(&self, model_name: &str, version: u64) -> StorageResult<ModelVersion> {
        self.handle.version_get(model_name, version).await
    }

    async fn list_versions(&self, model_name: &str) -> StorageResult<Vec<ModelVersion>> {
        self.handle.version_list(model_name).await
    }

    async fn set_alias(
        &self,
        model_name: &str,
        alias: &str,
        version: u64,
    ) -> StorageResult<Option<u64>> {
        let mut last_conflict = None;
        for attempt in 1..=MAX_SET_ALIAS_ATTEMPTS {
            let current = self.handle.alias_current(model_name, alias).await?;
            match self
                .handle
                .alias_compare_and_set(model_name, alias, current, version)
                .await
            {
                Err(err @ StorageError::AliasConflict { .. }) => {
                    debug!(attempt, model = model_name, alias, "Alias moved concurrently, retrying");
                    last_conflict = Some(err);
                }
                other => return other,
            }
        }
        Err(last_conflict.unwrap_or_else(|| {
            StorageError::Backend(format!("could not rebind alias '{alias}'"))
        }))
    }

    async fn compare_and_set_alias(
        &self,
        model_name: &str,
        alias: &str,
        expected: Option<u64>,
        version: u64,
    ) -> StorageResult<Option<u64>> {
        self.handle
            .alias_compare_and_set(model_name, alias, expected, version)
            .await
    }

    async fn resolve_alias(
        &self,
        model_name: &str,
        alias: &str,
    ) -> StorageResult<Option<ModelVersion>> {
        match self.handle.alias_current(model_name, alias).await? {
            Some(version) => self.handle.version_get(model_name, version).await.map(Some),
            None => Ok(None),
        }
    }

    async fn list_aliases(&self, model_name: &str) -> StorageResult<Vec<AliasBinding>> {
        self.handle.alias_list(model_name).await
    }

    async fn alias_history(
        &self,
        model_name: &str,
        alias: &str,
    ) -> StorageResult<Vec<AliasEvent>> {
        self.handle.alias_history(model_name, alias).await
    }
}

/// SurrealDB-backed implementation of the RunTracker trait.
#[derive(Clone)]
pub struct SurrealRunTracker {
    handle: Arc<SurrealHandle>,
}

impl SurrealRunTracker {
    pub fn new(handle: Arc<SurrealHandle>) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl RunTracker for SurrealRunTracker {
    async fn create_run(&self, run: NewRun) -> StorageResult<RunRecord> {
        self.handle.run_create(run).await
    }

    async fn log_metrics(
        &self,
        run_id: &RunId,
        metrics: &BTreeMap<String, f64>,
    ) -> StorageResult<()> {
        self.handle.run_log_metrics(run_id, metrics).await
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        self.handle.run_get(run_id).await
    }

    async fn get_metrics(&self, run_id: &RunId) -> StorageResult<BTreeMap<String, f64>> {
        self.handle.run_metrics(run_id).await
    }

    async fn list_runs(&self, experiment: Option<&str>) -> StorageResult<Vec<RunRecord>> {
        self.handle.run_list(experiment).await
    }
}
