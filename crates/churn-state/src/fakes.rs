//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryArtifactStore`, `MemoryRunTracker`, and
//! `MemoryModelRegistry` that satisfy the trait contracts without any
//! external dependencies.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryArtifactStore
// ---------------------------------------------------------------------------

/// In-memory content-addressed store backed by a `HashMap<digest, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    store: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, data: &[u8]) -> StorageResult<ContentDigest> {
        let digest = ContentDigest::from_bytes(data);
        let mut store = self.store.lock().unwrap();
        store.insert(digest.as_str().to_string(), data.to_vec());
        Ok(digest)
    }

    async fn get(&self, digest: &ContentDigest) -> StorageResult<Vec<u8>> {
        let store = self.store.lock().unwrap();
        store
            .get(digest.as_str())
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                digest: digest.as_str().to_string(),
            })
    }

    async fn contains(&self, digest: &ContentDigest) -> StorageResult<bool> {
        let store = self.store.lock().unwrap();
        Ok(store.contains_key(digest.as_str()))
    }
}

// ---------------------------------------------------------------------------
// MemoryRunTracker
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RunState {
    record: RunRecord,
    metrics: BTreeMap<String, f64>,
}

/// In-memory run tracker. Runs are kept in creation order.
#[derive(Debug, Default)]
pub struct MemoryRunTracker {
    runs: Mutex<Vec<RunState>>,
}

impl MemoryRunTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunTracker for MemoryRunTracker {
    async fn create_run(&self, run: NewRun) -> StorageResult<RunRecord> {
        let record = RunRecord {
            run_id: RunId::new(),
            experiment: run.experiment,
            params: run.params,
            artifact: run.artifact,
            created_at: Utc::now(),
        };
        let mut runs = self.runs.lock().unwrap();
        runs.push(RunState {
            record: record.clone(),
            metrics: BTreeMap::new(),
        });
        Ok(record)
    }

    async fn log_metrics(
        &self,
        run_id: &RunId,
        metrics: &BTreeMap<String, f64>,
    ) -> StorageResult<()> {
        let mut runs = self.runs.lock().unwrap();
        let state = runs
            .iter_mut()
            .find(|s| s.record.run_id == *run_id)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })?;
        for (key, value) in metrics {
            state.metrics.insert(key.clone(), *value);
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        let runs = self.runs.lock().unwrap();
        runs.iter()
            .find(|s| s.record.run_id == *run_id)
            .map(|s| s.record.clone())
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })
    }

    async fn get_metrics(&self, run_id: &RunId) -> StorageResult<BTreeMap<String, f64>> {
        let runs = self.runs.lock().unwrap();
        runs.iter()
            .find(|s| s.record.run_id == *run_id)
            .map(|s| s.metrics.clone())
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })
    }

    async fn list_runs(&self, experiment: Option<&str>) -> StorageResult<Vec<RunRecord>> {
        let runs = self.runs.lock().unwrap();
        Ok(runs
            .iter()
            .filter(|s| experiment.map(|e| s.record.experiment == e).unwrap_or(true))
            .map(|s| s.record.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryModelRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ModelState {
    versions: Vec<ModelVersion>,
    aliases: BTreeMap<String, AliasBinding>,
    history: Vec<AliasEvent>,
}

impl ModelState {
    fn current(&self, alias: &str) -> Option<u64> {
        self.aliases.get(alias).map(|b| b.version)
    }

    fn version_mut(&mut self, version: u64) -> Option<&mut ModelVersion> {
        self.versions.iter_mut().find(|v| v.version == version)
    }

    /// Rebind `alias` and apply archive/activate bookkeeping. The caller has
    /// already validated `version` and the expected binding.
    fn bind(&mut self, model_name: &str, alias: &str, version: u64) -> Option<u64> {
        let previous = self.current(alias);
        if previous == Some(version) {
            return previous;
        }
        let now = Utc::now();
        self.aliases.insert(
            alias.to_string(),
            AliasBinding {
                model_name: model_name.to_string(),
                alias: alias.to_string(),
                version,
                updated_at: now,
            },
        );
        self.history.push(AliasEvent {
            model_name: model_name.to_string(),
            alias: alias.to_string(),
            version,
            previous,
            created_at: now,
        });

        if let Some(v) = self.version_mut(version) {
            v.status = VersionStatus::Active;
        }
        if let Some(prev) = previous.filter(|p| *p != version) {
            let still_bound = self.aliases.values().any(|b| b.version == prev);
            if !still_bound {
                if let Some(v) = self.version_mut(prev) {
                    v.status = VersionStatus::Archived;
                }
            }
        }
        previous
    }
}

/// In-memory model registry backed by a `HashMap<model name, ModelState>`.
///
/// A single mutex guards every model, so each operation is atomic.
#[derive(Debug, Default)]
pub struct MemoryModelRegistry {
    models: Mutex<HashMap<String, ModelState>>,
}

impl MemoryModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelRegistry for MemoryModelRegistry {
    async fn register(
        &self,
        model_name: &str,
        artifact: &ContentDigest,
        run_id: Option<&RunId>,
    ) -> StorageResult<ModelVersion> {
        let mut models = self.models.lock().unwrap();
        let state = models.entry(model_name.to_string()).or_default();
        let next = state.versions.iter().map(|v| v.version).max().unwrap_or(0) + 1;
        let record = ModelVersion {
            model_name: model_name.to_string(),
            version: next,
            artifact: artifact.clone(),
            run_id: run_id.cloned(),
            status: VersionStatus::Active,
            created_at: Utc::now(),
        };
        state.versions.push(record.clone());
        Ok(record)
    }

    async fn get_version(&self, model_name: &str, version: u64) -> StorageResult<ModelVersion> {
        let models = self.models.lock().unwrap();
        models
            .get(model_name)
            .and_then(|s| s.versions.iter().find(|v| v.version == version))
            .cloned()
            .ok_or_else(|| StorageError::VersionNotFound {
                name: model_name.to_string(),
                version,
            })
    }

    async fn list_versions(&self, model_name: &str) -> StorageResult<Vec<ModelVersion>> {
        let models = self.models.lock().unwrap();
        Ok(models
            .get(model_name)
            .map(|s| s.versions.clone())
            .unwrap_or_default())
    }

    async fn set_alias(
        &self,
        model_name: &str,
        alias: &str,
        version: u64,
    ) -> StorageResult<Option<u64>> {
        let mut models = self.models.lock().unwrap();
        let state = models
            .get_mut(model_name)
            .filter(|s| s.versions.iter().any(|v| v.version == version))
            .ok_or_else(|| StorageError::VersionNotFound {
                name: model_name.to_string(),
                version,
            })?;
        Ok(state.bind(model_name, alias, version))
    }

    async fn compare_and_set_alias(
        &self,
        model_name: &str,
        alias: &str,
        expected: Option<u64>,
        version: u64,
    ) -> StorageResult<Option<u64>> {
        let mut models = self.models.lock().unwrap();
        let state = models
            .get_mut(model_name)
            .filter(|s| s.versions.iter().any(|v| v.version == version))
            .ok_or_else(|| StorageError::VersionNotFound {
                name: model_name.to_string(),
                version,
            })?;
        let actual = state.current(alias);
        if actual != expected {
            return Err(StorageError::AliasConflict {
                name: model_name.to_string(),
                alias: alias.to_string(),
                expected,
                actual,
            });
        }
        Ok(state.bind(model_name, alias, version))
    }

    async fn resolve_alias(
        &self,
        model_name: &str,
        alias: &str,
    ) -> StorageResult<Option<ModelVersion>> {
        let models = self.models.lock().unwrap();
        Ok(models.get(model_name).and_then(|s| {
            let version = s.current(alias)?;
            s.versions.iter().find(|v| v.version == version).cloned()
        }))
    }

    async fn list_aliases(&self, model_name: &str) -> StorageResult<Vec<AliasBinding>> {
        let models = self.models.lock().unwrap();
        Ok(models
            .get(model_name)
            .map(|s| s.aliases.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn alias_history(
        &self,
        model_name: &str,
        alias: &str,
    ) -> StorageResult<Vec<AliasEvent>> {
        let models = self.models.lock().unwrap();
        let mut history: Vec<AliasEvent> = models
            .get(model_name)
            .map(|s| {
                s.history
                    .iter()
                    .filter(|e| e.alias == alias)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        history.reverse(); // newest first
        Ok(history)
    }
}
