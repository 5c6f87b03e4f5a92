//! Pre-promotion quality gate.
//!
//! Scores a registered version on the held-out table and checks the result
//! against minimum accuracy and F1 thresholds. A failing verdict blocks
//! promotion.

use serde::{Deserialize, Serialize};

use churn_state::ModelVersion;

use crate::config::DeploymentConfig;
use crate::domain::{
    ClassificationMetrics, EncodedTable, Result, Stage, StageContext, TrainedPipeline,
};
use crate::evaluate::score_pipeline;
use crate::obs;
use crate::stores::LifecycleStores;

/// A single gate rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateRule {
    /// Accuracy must be at least `min_accuracy`.
    MinAccuracy,
    /// F1 must be at least `min_f1`.
    MinF1,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityGate {
    pub min_accuracy: f64,
    pub min_f1: f64,
    pub rules: Vec<GateRule>,
}

impl QualityGate {
    /// Both rules with the given thresholds.
    pub fn new(min_accuracy: f64, min_f1: f64) -> Self {
        Self {
            min_accuracy,
            min_f1,
            rules: vec![GateRule::MinAccuracy, GateRule::MinF1],
        }
    }

    pub fn from_deployment(deployment: &DeploymentConfig) -> Self {
        Self::new(deployment.min_accuracy, deployment.min_f1)
    }
}

/// A single rule violation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Violation {
    pub rule: GateRule,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateVerdict {
    pub metrics: ClassificationMetrics,
    /// Violations found (empty when passed).
    pub violations: Vec<Violation>,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check `metrics` against every rule of `gate`.
pub fn evaluate_gate(gate: &QualityGate, metrics: &ClassificationMetrics) -> GateVerdict {
    let violations = gate
        .rules
        .iter()
        .filter_map(|rule| match rule {
            GateRule::MinAccuracy if metrics.accuracy < gate.min_accuracy => Some(Violation {
                rule: *rule,
                reason: format!(
                    "accuracy {:.4} < threshold {:.4}",
                    metrics.accuracy, gate.min_accuracy
                ),
            }),
            GateRule::MinF1 if metrics.f1_score < gate.min_f1 => Some(Violation {
                rule: *rule,
                reason: format!(
                    "f1_score {:.4} < threshold {:.4}",
                    metrics.f1_score, gate.min_f1
                ),
            }),
            _ => None,
        })
        .collect();

    GateVerdict {
        metrics: *metrics,
        violations,
    }
}

/// Load `version`'s pipeline and score its estimator on the pre-encoded
/// holdout table.
pub async fn score_version(
    stores: &LifecycleStores,
    version: &ModelVersion,
    holdout: &EncodedTable,
) -> Result<ClassificationMetrics> {
    let bytes = stores.artifacts.get(&version.artifact).await?;
    let pipeline = TrainedPipeline::from_bytes(&bytes)?;
    score_pipeline(&pipeline, holdout)
}

/// Score `version` and apply `gate`.
pub async fn check_version(
    stores: &LifecycleStores,
    gate: &QualityGate,
    version: &ModelVersion,
    holdout: &EncodedTable,
) -> Result<GateVerdict> {
    let metrics = score_version(stores, version, holdout)
        .await
        .stage(Stage::Gate, &version.model_name)?;
    let verdict = evaluate_gate(gate, &metrics);
    obs::emit_gate_evaluated(
        &version.model_name,
        version.version,
        verdict.passed(),
        verdict.violations.len(),
    );
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(accuracy: f64, f1_score: f64) -> ClassificationMetrics {
        ClassificationMetrics {
            accuracy,
            precision: 0.0,
            recall: 0.0,
            f1_score,
        }
    }

    #[test]
    fn passes_at_exact_thresholds() {
        let gate = QualityGate::new(0.7, 0.5);
        assert!(evaluate_gate(&gate, &metrics(0.7, 0.5)).passed());
    }

    #[test]
    fn reports_each_failed_rule() {
        let gate = QualityGate::new(0.7, 0.5);
        let verdict = evaluate_gate(&gate, &metrics(0.6, 0.4));
        assert!(!verdict.passed());
        let rules: Vec<_> = verdict.violations.iter().map(|v| v.rule).collect();
        assert_eq!(rules, vec![GateRule::MinAccuracy, GateRule::MinF1]);
        assert!(verdict.violations[0].reason.contains("accuracy 0.6000"));
    }

    #[test]
    fn only_configured_rules_apply() {
        let gate = QualityGate {
            rules: vec![GateRule::MinF1],
            ..QualityGate::new(0.99, 0.5)
        };
        assert!(evaluate_gate(&gate, &metrics(0.1, 0.9)).passed());
    }
}
