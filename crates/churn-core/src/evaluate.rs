//! Champion/challenger evaluation.
//!
//! A candidate run is scored on the pre-encoded holdout table, its metrics
//! are logged against the run, and the pipeline currently bound to the
//! production alias is re-scored on the same data. The candidate is
//! registered and bound to the staging alias only when its target metric
//! strictly beats the incumbent's; ties are discarded.
//!
//! Both models are scored through their estimator alone: the holdout table
//! was encoded during preparation, so the embedded encoder is bypassed here
//! while serving always goes through it.

use churn_state::RunId;
use serde::{Deserialize, Serialize};

use crate::config::ChurnConfig;
use crate::domain::{
    ChurnError, ClassificationMetrics, EncodedTable, Result, Stage, StageContext, TargetMetric,
    TrainedPipeline,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::stores::LifecycleStores;

/// Names and metric the evaluator decides with.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationPolicy {
    pub model_name: String,
    pub target_metric: TargetMetric,
    pub staging_alias: String,
    pub production_alias: String,
}

impl From<&ChurnConfig> for EvaluationPolicy {
    fn from(config: &ChurnConfig) -> Self {
        Self {
            model_name: config.model.name.clone(),
            target_metric: config.model.target_metric,
            staging_alias: config.deployment.source_alias.clone(),
            production_alias: config.deployment.target_alias.clone(),
        }
    }
}

/// Score of the currently promoted model on the candidate's holdout set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IncumbentScore {
    Available { version: u64, score: f64 },
    Unavailable { reason: String },
}

impl IncumbentScore {
    /// Score used in the comparison; an unavailable incumbent scores 0.0.
    pub fn score(&self) -> f64 {
        match self {
            IncumbentScore::Available { score, .. } => *score,
            IncumbentScore::Unavailable { .. } => 0.0,
        }
    }

    pub fn version(&self) -> Option<u64> {
        match self {
            IncumbentScore::Available { version, .. } => Some(*version),
            IncumbentScore::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, IncumbentScore::Available { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    /// Registered as `version` and bound to the staging alias.
    Staged {
        version: u64,
        previous_staging: Option<u64>,
    },
    /// Did not beat the incumbent; the registry was not touched.
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub run_id: RunId,
    pub metrics: ClassificationMetrics,
    pub target_metric: TargetMetric,
    pub candidate_score: f64,
    pub incumbent: IncumbentScore,
    pub outcome: EvaluationOutcome,
}

impl EvaluationReport {
    pub fn staged_version(&self) -> Option<u64> {
        match self.outcome {
            EvaluationOutcome::Staged { version, .. } => Some(version),
            EvaluationOutcome::Discarded => None,
        }
    }
}

/// The champion/challenger decision rule.
///
/// The candidate wins if it strictly beats an available incumbent. With no
/// incumbent to compare against it always wins.
pub fn candidate_wins(candidate: f64, incumbent: &IncumbentScore) -> bool {
    match incumbent {
        IncumbentScore::Available { score, .. } => candidate > *score,
        IncumbentScore::Unavailable { .. } => true,
    }
}

pub struct Evaluator {
    stores: LifecycleStores,
    policy: EvaluationPolicy,
}

impl Evaluator {
    pub fn new(stores: LifecycleStores, policy: EvaluationPolicy) -> Self {
        Self { stores, policy }
    }

    pub fn policy(&self) -> &EvaluationPolicy {
        &self.policy
    }

    /// Run one promotion attempt for `run_id` against `holdout`.
    pub async fn evaluate(&self, run_id: &RunId, holdout: &EncodedTable) -> Result<EvaluationReport> {
        let _span = obs::RunSpan::enter(&run_id.0);
        let model = self.policy.model_name.as_str();
        METRICS.inc_evaluations();

        let metrics = self
            .score_candidate(run_id, holdout)
            .await
            .stage(Stage::Evaluate, model)?;
        let candidate_score = metrics.get(self.policy.target_metric);
        obs::emit_candidate_scored(&run_id.0, self.policy.target_metric.as_str(), candidate_score);

        self.stores
            .runs
            .log_metrics(run_id, &metrics.to_map())
            .await
            .stage(Stage::Evaluate, model)?;

        let incumbent = self.score_incumbent(holdout).await;
        let staged = candidate_wins(candidate_score, &incumbent);
        obs::emit_evaluation_decided(model, candidate_score, incumbent.score(), staged);

        let outcome = if staged {
            self.stage(run_id).await?
        } else {
            EvaluationOutcome::Discarded
        };

        Ok(EvaluationReport {
            run_id: run_id.clone(),
            metrics,
            target_metric: self.policy.target_metric,
            candidate_score,
            incumbent,
            outcome,
        })
    }

    async fn score_candidate(
        &self,
        run_id: &RunId,
        holdout: &EncodedTable,
    ) -> Result<ClassificationMetrics> {
        let run = self.stores.runs.get_run(run_id).await?;
        let bytes = self.stores.artifacts.get(&run.artifact).await?;
        let pipeline = TrainedPipeline::from_bytes(&bytes)?;
        score_pipeline(&pipeline, holdout)
    }

    /// Never fails: any problem makes the incumbent unavailable.
    async fn score_incumbent(&self, holdout: &EncodedTable) -> IncumbentScore {
        match self.try_score_incumbent(holdout).await {
            Ok(incumbent) => incumbent,
            Err(e) => {
                obs::emit_incumbent_unavailable(&self.policy.model_name, &e);
                IncumbentScore::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_score_incumbent(&self, holdout: &EncodedTable) -> Result<IncumbentScore> {
        let policy = &self.policy;
        let Some(version) = self
            .stores
            .registry
            .resolve_alias(&policy.model_name, &policy.production_alias)
            .await?
        else {
            let reason = format!("no version bound to alias '{}'", policy.production_alias);
            obs::emit_incumbent_unavailable(&policy.model_name, &reason);
            return Ok(IncumbentScore::Unavailable { reason });
        };

        let bytes = self.stores.artifacts.get(&version.artifact).await?;
        let pipeline = TrainedPipeline::from_bytes(&bytes)?;
        let metrics = score_pipeline(&pipeline, holdout)?;
        Ok(IncumbentScore::Available {
            version: version.version,
            score: metrics.get(policy.target_metric),
        })
    }

    async fn stage(&self, run_id: &RunId) -> Result<EvaluationOutcome> {
        let policy = &self.policy;
        let model = policy.model_name.as_str();

        let run = self
            .stores
            .runs
            .get_run(run_id)
            .await
            .stage(Stage::Register, model)?;
        let version = self
            .stores
            .registry
            .register(model, &run.artifact, Some(run_id))
            .await
            .stage(Stage::Register, model)?;
        let previous_staging = self
            .stores
            .registry
            .set_alias(model, &policy.staging_alias, version.version)
            .await
            .stage(Stage::Register, model)?;

        METRICS.inc_versions_staged();
        obs::emit_version_staged(model, version.version, &policy.staging_alias, previous_staging);
        Ok(EvaluationOutcome::Staged {
            version: version.version,
            previous_staging,
        })
    }
}

/// Predict with the estimator on the pre-encoded table and compute metrics.
pub(crate) fn score_pipeline(
    pipeline: &TrainedPipeline,
    holdout: &EncodedTable,
) -> Result<ClassificationMetrics> {
    if pipeline.feature_columns.as_slice() != holdout.feature_columns() {
        return Err(ChurnError::InvalidData(format!(
            "pipeline expects columns {:?}, holdout has {:?}",
            pipeline.feature_columns,
            holdout.feature_columns()
        )));
    }
    let (x, y) = holdout.split_xy()?;
    let predictions = pipeline.predict_encoded(&x)?;
    ClassificationMetrics::compute(&y, &predictions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_do_not_win() {
        let incumbent = IncumbentScore::Available {
            version: 1,
            score: 0.8,
        };
        assert!(!candidate_wins(0.8, &incumbent));
        assert!(!candidate_wins(0.79, &incumbent));
        assert!(candidate_wins(0.81, &incumbent));
    }

    #[test]
    fn unavailable_incumbent_always_admits_candidate() {
        let incumbent = IncumbentScore::Unavailable {
            reason: "no version bound".into(),
        };
        assert_eq!(incumbent.score(), 0.0);
        assert!(candidate_wins(0.0, &incumbent));
    }

    #[test]
    fn report_serializes_decision_tags() {
        let outcome = EvaluationOutcome::Staged {
            version: 3,
            previous_staging: Some(2),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["decision"], "staged");
        let incumbent = serde_json::to_value(IncumbentScore::Unavailable {
            reason: "x".into(),
        })
        .unwrap();
        assert_eq!(incumbent["status"], "unavailable");
    }
}
