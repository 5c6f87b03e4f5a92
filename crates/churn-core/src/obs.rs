//! Structured observability hooks for lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `RunSpan` RAII guard
//! - Emission functions for evaluation, staging, gate, promotion, rollback
//!   and serving events
//!
//! Events carry an `event = "..."` field so log pipelines can filter on it.
//! Set `RUST_LOG` to adjust verbosity.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped tracing span.
///
/// ```ignore
/// let _span = RunSpan::enter("5c1f...");
/// // every event in scope carries run_id = "5c1f..."
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("churn.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a training run was recorded.
pub fn emit_run_trained(run_id: &str, model: &str, artifact: &str) {
    info!(event = "run.trained", run_id = %run_id, model = %model, artifact = %artifact);
}

/// Emit event: candidate scored on the holdout set.
pub fn emit_candidate_scored(run_id: &str, metric: &str, score: f64) {
    info!(event = "evaluation.candidate_scored", run_id = %run_id, metric = %metric, score = score);
}

/// Emit event: the incumbent could not be scored (warning level).
pub fn emit_incumbent_unavailable(model: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "evaluation.incumbent_unavailable", model = %model, reason = %reason);
}

/// Emit event: champion/challenger decision taken.
pub fn emit_evaluation_decided(model: &str, candidate: f64, incumbent: f64, staged: bool) {
    info!(
        event = "evaluation.decided",
        model = %model,
        candidate = candidate,
        incumbent = incumbent,
        staged = staged,
    );
}

/// Emit event: a new version was registered and bound to an alias.
pub fn emit_version_staged(model: &str, version: u64, alias: &str, previous: Option<u64>) {
    info!(
        event = "registry.version_staged",
        model = %model,
        version = version,
        alias = %alias,
        previous = ?previous,
    );
}

/// Emit event: quality gate evaluated.
pub fn emit_gate_evaluated(model: &str, version: u64, passed: bool, violations: usize) {
    info!(
        event = "gate.evaluated",
        model = %model,
        version = version,
        passed = passed,
        violations = violations,
    );
}

/// Emit event: promotion attempt finished with `outcome`.
pub fn emit_promotion(model: &str, outcome: &str, version: Option<u64>, previous: Option<u64>) {
    info!(
        event = "promotion.finished",
        model = %model,
        outcome = %outcome,
        version = ?version,
        previous = ?previous,
    );
}

/// Emit event: an alias was moved back to its previous binding.
pub fn emit_alias_rolled_back(model: &str, alias: &str, from: u64, to: u64) {
    info!(event = "registry.rolled_back", model = %model, alias = %alias, from = from, to = to);
}

/// Emit event: the serving cache now holds `version`.
pub fn emit_model_loaded(model: &str, alias: &str, version: u64) {
    info!(event = "serving.model_loaded", model = %model, alias = %alias, version = version);
}

/// Emit event: a serving reload failed; the previous model stays active.
pub fn emit_reload_failed(model: &str, error: &dyn std::fmt::Display) {
    warn!(event = "serving.reload_failed", model = %model, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_span_enters() {
        let _span = RunSpan::enter("test-run-id");
        emit_candidate_scored("test-run-id", "f1_score", 0.5);
    }
}
