//! Typed lifecycle configuration loaded from `churn.toml`.
//!
//! The file is parsed and validated once at startup; everything downstream
//! receives the typed [`ChurnConfig`].
//!
//! ```toml
//! [model]
//! name = "churn-classifier"
//! target_metric = "f1_score"
//!
//! [deployment]
//! source_alias = "staging"
//! target_alias = "production"
//! min_accuracy = 0.7
//! min_f1 = 0.5
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{LogisticParams, TargetMetric};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field} ({value}): {reason}")]
    Invalid {
        field: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnConfig {
    pub model: ModelConfig,
    pub deployment: DeploymentConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Registered model name
    pub name: String,
    /// Metric the champion/challenger comparison is decided on
    pub target_metric: TargetMetric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Alias new candidates are staged under
    pub source_alias: String,
    /// Alias the serving layer reads
    pub target_alias: String,
    pub min_accuracy: f64,
    pub min_f1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub experiment: String,
    pub target_column: String,
    pub id_column: Option<String>,
    pub test_size: f64,
    pub random_seed: u64,
    pub estimator: LogisticParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            experiment: "churn-training".to_string(),
            target_column: "churn".to_string(),
            id_column: Some("customer_id".to_string()),
            test_size: 0.2,
            random_seed: 42,
            estimator: LogisticParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub artifacts_root: PathBuf,
    pub raw_data: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifacts_root: PathBuf::from("artifacts"),
            raw_data: PathBuf::from("data/customers.jsonl"),
        }
    }
}

impl PathsConfig {
    /// Ingested dataset (raw records, JSON).
    pub fn dataset(&self) -> PathBuf {
        self.artifacts_root.join("data_ingestion").join("dataset.json")
    }

    pub fn encoder(&self) -> PathBuf {
        self.artifacts_root
            .join("data_transformation")
            .join("encoder.json")
    }

    pub fn train_table(&self) -> PathBuf {
        self.artifacts_root
            .join("data_transformation")
            .join("train.json")
    }

    pub fn test_table(&self) -> PathBuf {
        self.artifacts_root
            .join("data_transformation")
            .join("test.json")
    }

    /// File the trainer leaves the latest run id in for the evaluator.
    pub fn run_id_file(&self) -> PathBuf {
        self.artifacts_root.join("model_trainer").join("run_id.txt")
    }

    pub fn metrics_file(&self) -> PathBuf {
        self.artifacts_root
            .join("model_evaluation")
            .join("metrics.json")
    }

    pub fn evaluation_file(&self) -> PathBuf {
        self.artifacts_root
            .join("model_evaluation")
            .join("evaluation.json")
    }

    /// Content-addressed artifact store directory.
    pub fn store(&self) -> PathBuf {
        self.artifacts_root.join("store")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// SurrealDB URL (`mem://`, `surrealkv://path`, `ws://host:port`)
    pub url: Option<String>,
}

impl ChurnConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ChurnConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_empty("model.name", &self.model.name)?;
        non_empty("deployment.source_alias", &self.deployment.source_alias)?;
        non_empty("deployment.target_alias", &self.deployment.target_alias)?;
        if self.deployment.source_alias == self.deployment.target_alias {
            return Err(invalid(
                "deployment.target_alias",
                &self.deployment.target_alias,
                "must differ from deployment.source_alias",
            ));
        }

        unit_interval("deployment.min_accuracy", self.deployment.min_accuracy)?;
        unit_interval("deployment.min_f1", self.deployment.min_f1)?;

        let training = &self.training;
        non_empty("training.target_column", &training.target_column)?;
        if training.id_column.as_deref() == Some(training.target_column.as_str()) {
            return Err(invalid(
                "training.id_column",
                &training.target_column,
                "must differ from training.target_column",
            ));
        }
        if !(training.test_size > 0.0 && training.test_size < 1.0) {
            return Err(invalid(
                "training.test_size",
                &training.test_size.to_string(),
                "must be strictly between 0.0 and 1.0",
            ));
        }

        let est = &training.estimator;
        if !(est.learning_rate.is_finite() && est.learning_rate > 0.0) {
            return Err(invalid(
                "training.estimator.learning_rate",
                &est.learning_rate.to_string(),
                "must be a positive number",
            ));
        }
        if est.max_iter == 0 {
            return Err(invalid(
                "training.estimator.max_iter",
                "0",
                "must be at least 1",
            ));
        }
        if !(est.alpha.is_finite() && est.alpha >= 0.0) {
            return Err(invalid(
                "training.estimator.alpha",
                &est.alpha.to_string(),
                "must be >= 0.0",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(field, value, "must not be empty"));
    }
    Ok(())
}

fn unit_interval(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(
            field,
            &value.to_string(),
            "must be between 0.0 and 1.0",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [model]
        name = "churn-classifier"
        target_metric = "f1_score"

        [deployment]
        source_alias = "staging"
        target_alias = "production"
        min_accuracy = 0.7
        min_f1 = 0.5
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = ChurnConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.model.target_metric, TargetMetric::F1Score);
        assert_eq!(config.training.test_size, 0.2);
        assert_eq!(config.training.random_seed, 42);
        assert_eq!(config.training.id_column.as_deref(), Some("customer_id"));
        assert!(config.registry.url.is_none());
        assert_eq!(
            config.paths.run_id_file(),
            PathBuf::from("artifacts/model_trainer/run_id.txt")
        );
    }

    #[test]
    fn missing_required_key_fails_to_parse() {
        let without_metric = MINIMAL.replace("target_metric = \"f1_score\"", "");
        let err = ChurnConfig::from_toml_str(&without_metric).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("target_metric"));
    }

    #[test]
    fn unknown_metric_is_rejected() {
        let bad = MINIMAL.replace("f1_score", "roc_auc");
        assert!(matches!(
            ChurnConfig::from_toml_str(&bad),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn threshold_out_of_range_is_invalid() {
        let bad = MINIMAL.replace("min_f1 = 0.5", "min_f1 = 1.5");
        match ChurnConfig::from_toml_str(&bad) {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "deployment.min_f1"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn identical_aliases_are_invalid() {
        let bad = MINIMAL.replace("\"production\"", "\"staging\"");
        match ChurnConfig::from_toml_str(&bad) {
            Err(ConfigError::Invalid { field, .. }) => {
                assert_eq!(field, "deployment.target_alias")
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn training_overrides_apply() {
        let toml = format!(
            "{MINIMAL}\n[training]\ntest_size = 0.3\n[training.estimator]\nmax_iter = 50\n[registry]\nurl = \"mem://\"\n"
        );
        let config = ChurnConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.training.test_size, 0.3);
        assert_eq!(config.training.estimator.max_iter, 50);
        assert_eq!(config.training.estimator.learning_rate, 0.1);
        assert_eq!(config.registry.url.as_deref(), Some("mem://"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ChurnConfig::load(Path::new("/nonexistent/churn.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn sample_config_is_valid() {
        let config = ChurnConfig::from_toml_str(include_str!("../../../churn.toml")).unwrap();
        assert_eq!(config.model.target_metric, TargetMetric::F1Score);
        assert_eq!(
            config.registry.url.as_deref(),
            Some("surrealkv://artifacts/registry")
        );
    }
}
