//! Alias promotion and rollback.
//!
//! Promotion moves the production alias to whatever the staging alias points
//! at. It is idempotent: with nothing staged, or with production already on
//! the staged version, it reports a no-op outcome instead of failing. The
//! rebind itself is a compare-and-set on the observed production binding,
//! so a concurrent writer makes the attempt re-resolve both aliases rather
//! than silently overwrite.

use serde::{Deserialize, Serialize};
use tracing::debug;

use churn_state::StorageError;

use crate::config::ChurnConfig;
use crate::domain::{ChurnError, EncodedTable, Result, Stage, StageContext};
use crate::gate::{check_version, GateVerdict, QualityGate};
use crate::metrics::METRICS;
use crate::obs;
use crate::stores::LifecycleStores;

/// Attempts made when the production alias keeps moving under us.
pub const MAX_PROMOTION_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionRequest {
    pub model_name: String,
    pub source_alias: String,
    pub target_alias: String,
}

impl From<&ChurnConfig> for PromotionRequest {
    fn from(config: &ChurnConfig) -> Self {
        Self {
            model_name: config.model.name.clone(),
            source_alias: config.deployment.source_alias.clone(),
            target_alias: config.deployment.target_alias.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PromotionOutcome {
    /// The source alias is unbound.
    NothingToPromote,
    /// The target alias already points at the source version.
    AlreadyPromoted { version: u64 },
    Promoted { version: u64, previous: Option<u64> },
    /// The quality gate failed; no alias was touched.
    Rejected { version: u64, verdict: GateVerdict },
}

impl PromotionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionOutcome::NothingToPromote => "nothing_to_promote",
            PromotionOutcome::AlreadyPromoted { .. } => "already_promoted",
            PromotionOutcome::Promoted { .. } => "promoted",
            PromotionOutcome::Rejected { .. } => "rejected",
        }
    }

    /// True for every outcome except a gate rejection.
    pub fn is_success(&self) -> bool {
        !matches!(self, PromotionOutcome::Rejected { .. })
    }
}

/// Gate applied before the production alias moves.
#[derive(Debug, Clone, Copy)]
pub struct GateCheck<'a> {
    pub gate: &'a QualityGate,
    pub holdout: &'a EncodedTable,
}

/// Promote the source alias's version to the target alias.
pub async fn promote(
    stores: &LifecycleStores,
    request: &PromotionRequest,
    gate: Option<GateCheck<'_>>,
) -> Result<PromotionOutcome> {
    let model = request.model_name.as_str();
    let mut gated: Option<u64> = None;

    for attempt in 1..=MAX_PROMOTION_ATTEMPTS {
        let Some(staged) = stores
            .registry
            .resolve_alias(model, &request.source_alias)
            .await
            .stage_alias(Stage::Promote, model, &request.source_alias)?
        else {
            return Ok(finish(model, PromotionOutcome::NothingToPromote));
        };

        let current = stores
            .registry
            .resolve_alias(model, &request.target_alias)
            .await
            .stage_alias(Stage::Promote, model, &request.target_alias)?
            .map(|v| v.version);
        if current == Some(staged.version) {
            return Ok(finish(
                model,
                PromotionOutcome::AlreadyPromoted {
                    version: staged.version,
                },
            ));
        }

        // The staged version may change between attempts; gate each one once.
        if let Some(check) = gate {
            if gated != Some(staged.version) {
                let verdict = check_version(stores, check.gate, &staged, check.holdout).await?;
                if !verdict.passed() {
                    return Ok(finish(
                        model,
                        PromotionOutcome::Rejected {
                            version: staged.version,
                            verdict,
                        },
                    ));
                }
                gated = Some(staged.version);
            }
        }

        match stores
            .registry
            .compare_and_set_alias(model, &request.target_alias, current, staged.version)
            .await
        {
            Ok(previous) => {
                METRICS.inc_promotions();
                return Ok(finish(
                    model,
                    PromotionOutcome::Promoted {
                        version: staged.version,
                        previous,
                    },
                ));
            }
            Err(StorageError::AliasConflict { actual, .. }) => {
                debug!(
                    model = %model,
                    attempt,
                    expected = ?current,
                    actual = ?actual,
                    "production alias moved, retrying"
                );
            }
            Err(e) => {
                return Err(ChurnError::from(e).at_alias(
                    Stage::Promote,
                    model,
                    &request.target_alias,
                ))
            }
        }
    }

    Err(ChurnError::from(StorageError::Backend(format!(
        "alias '{}' kept changing after {MAX_PROMOTION_ATTEMPTS} attempts",
        request.target_alias
    )))
    .at_alias(Stage::Promote, model, &request.target_alias))
}

fn finish(model: &str, outcome: PromotionOutcome) -> PromotionOutcome {
    let (version, previous) = match &outcome {
        PromotionOutcome::NothingToPromote => (None, None),
        PromotionOutcome::AlreadyPromoted { version } => (Some(*version), Some(*version)),
        PromotionOutcome::Promoted { version, previous } => (Some(*version), *previous),
        PromotionOutcome::Rejected { version, .. } => (Some(*version), None),
    };
    obs::emit_promotion(model, outcome.as_str(), version, previous);
    outcome
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub alias: String,
    pub from: u64,
    pub to: u64,
}

/// Rebind `alias` to the version it pointed at before its latest rebind.
///
/// Repeating a rollback toggles between the last two bindings.
pub async fn rollback(
    stores: &LifecycleStores,
    model_name: &str,
    alias: &str,
) -> Result<RollbackOutcome> {
    let history = stores
        .registry
        .alias_history(model_name, alias)
        .await
        .stage_alias(Stage::Rollback, model_name, alias)?;

    let no_previous = || {
        ChurnError::from(StorageError::NoPreviousBinding {
            name: model_name.to_string(),
            alias: alias.to_string(),
        })
        .at_alias(Stage::Rollback, model_name, alias)
    };
    let latest = history.first().ok_or_else(no_previous)?;
    let to = latest.previous.ok_or_else(no_previous)?;

    stores
        .registry
        .compare_and_set_alias(model_name, alias, Some(latest.version), to)
        .await
        .stage_alias(Stage::Rollback, model_name, alias)?;

    obs::emit_alias_rolled_back(model_name, alias, latest.version, to);
    Ok(RollbackOutcome {
        alias: alias.to_string(),
        from: latest.version,
        to,
    })
}
