//! Serving-side model resolution.
//!
//! [`PredictionService`] only ever reads the production alias. The pipeline
//! it points at is loaded once and cached for the life of the service;
//! [`PredictionService::reload`] swaps in a newer binding without dropping
//! the current model on failure.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use churn_state::{ArtifactStore, ModelRegistry};

use crate::config::ChurnConfig;
use crate::domain::{
    ChurnError, CustomerProfile, FeatureRecord, TrainedPipeline, DECISION_THRESHOLD,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::stores::LifecycleStores;

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// No version is bound to the serving alias.
    #[error("model '{model}' is not ready: no version bound to alias '{alias}'")]
    NotReady { model: String, alias: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to load model: {0}")]
    Load(#[source] ChurnError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChurnLabel {
    #[serde(rename = "Churn")]
    Churn,
    #[serde(rename = "No Churn")]
    NoChurn,
}

impl ChurnLabel {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= DECISION_THRESHOLD {
            ChurnLabel::Churn
        } else {
            ChurnLabel::NoChurn
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChurnLabel::Churn => "Churn",
            ChurnLabel::NoChurn => "No Churn",
        }
    }
}

impl std::fmt::Display for ChurnLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: ChurnLabel,
    /// Probability of churn, in `[0, 1]`.
    pub probability: f64,
    pub model_version: u64,
}

#[derive(Debug)]
struct LoadedModel {
    version: u64,
    pipeline: TrainedPipeline,
}

pub struct PredictionService {
    registry: Arc<dyn ModelRegistry>,
    artifacts: Arc<dyn ArtifactStore>,
    model_name: String,
    alias: String,
    cache: RwLock<Option<Arc<LoadedModel>>>,
    /// Serializes loads so concurrent cold starts fetch the artifact once.
    load_lock: Mutex<()>,
}

impl PredictionService {
    pub fn new(
        registry: Arc<dyn ModelRegistry>,
        artifacts: Arc<dyn ArtifactStore>,
        model_name: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            artifacts,
            model_name: model_name.into(),
            alias: alias.into(),
            cache: RwLock::new(None),
            load_lock: Mutex::new(()),
        }
    }

    /// Serve `config.deployment.target_alias` of `config.model.name`.
    pub fn from_config(stores: &LifecycleStores, config: &ChurnConfig) -> Self {
        Self::new(
            stores.registry.clone(),
            stores.artifacts.clone(),
            config.model.name.clone(),
            config.deployment.target_alias.clone(),
        )
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Version currently cached, if any.
    pub async fn loaded_version(&self) -> Option<u64> {
        self.cache.read().await.as_ref().map(|m| m.version)
    }

    pub async fn predict(&self, profile: CustomerProfile) -> Result<Prediction, ServeError> {
        self.predict_record(profile.into()).await
    }

    pub async fn predict_record(&self, record: FeatureRecord) -> Result<Prediction, ServeError> {
        let model = self.ensure_loaded().await?;

        let scored = model
            .pipeline
            .score_records(std::slice::from_ref(&record))
            .map_err(|e| match e {
                ChurnError::InvalidData(msg) => ServeError::InvalidInput(msg),
                ChurnError::ShapeMismatch { expected, actual } => ServeError::InvalidInput(
                    format!("expected {expected} features, got {actual}"),
                ),
                other => ServeError::Load(other),
            })?;
        let scored = scored
            .first()
            .copied()
            .ok_or_else(|| ServeError::InvalidInput("no prediction produced".to_string()))?;

        let prediction = ChurnLabel::from_probability(scored.probability);
        METRICS.inc_prediction(prediction == ChurnLabel::Churn);
        METRICS.add_unseen_categories(scored.unseen as u64);
        if scored.unseen > 0 {
            debug!(unseen = scored.unseen, "unseen categories mapped to index 0");
        }

        Ok(Prediction {
            prediction,
            probability: scored.probability,
            model_version: model.version,
        })
    }

    /// Re-resolve the alias and swap the cached model.
    ///
    /// On any failure the previously cached model keeps serving.
    pub async fn reload(&self) -> Result<u64, ServeError> {
        let _guard = self.load_lock.lock().await;
        match self.load().await {
            Ok(model) => {
                let version = model.version;
                *self.cache.write().await = Some(model);
                Ok(version)
            }
            Err(e) => {
                obs::emit_reload_failed(&self.model_name, &e);
                Err(e)
            }
        }
    }

    async fn ensure_loaded(&self) -> Result<Arc<LoadedModel>, ServeError> {
        if let Some(model) = self.cache.read().await.as_ref() {
            return Ok(model.clone());
        }

        let _guard = self.load_lock.lock().await;
        // Another request may have finished the load while we waited.
        if let Some(model) = self.cache.read().await.as_ref() {
            return Ok(model.clone());
        }

        let model = self.load().await?;
        *self.cache.write().await = Some(model.clone());
        Ok(model)
    }

    async fn load(&self) -> Result<Arc<LoadedModel>, ServeError> {
        let resolved = self
            .registry
            .resolve_alias(&self.model_name, &self.alias)
            .await
            .map_err(|e| ServeError::Load(e.into()))?;
        let Some(version) = resolved else {
            METRICS.inc_not_ready();
            return Err(ServeError::NotReady {
                model: self.model_name.clone(),
                alias: self.alias.clone(),
            });
        };

        let bytes = self
            .artifacts
            .get(&version.artifact)
            .await
            .map_err(|e| ServeError::Load(e.into()))?;
        let pipeline = TrainedPipeline::from_bytes(&bytes).map_err(ServeError::Load)?;

        METRICS.inc_models_loaded();
        obs::emit_model_loaded(&self.model_name, &self.alias, version.version);
        Ok(Arc::new(LoadedModel {
            version: version.version,
            pipeline,
        }))
    }
}
