//! Global atomic counters for lifecycle and serving observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at process exit or after a batch of
//! predictions).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters; no allocations, no locking.
pub struct Metrics {
    predictions_total: AtomicU64,
    churn_predictions: AtomicU64,
    unseen_categories: AtomicU64,
    not_ready_rejections: AtomicU64,
    models_loaded: AtomicU64,
    evaluations_run: AtomicU64,
    versions_staged: AtomicU64,
    promotions: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            predictions_total: AtomicU64::new(0),
            churn_predictions: AtomicU64::new(0),
            unseen_categories: AtomicU64::new(0),
            not_ready_rejections: AtomicU64::new(0),
            models_loaded: AtomicU64::new(0),
            evaluations_run: AtomicU64::new(0),
            versions_staged: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
        }
    }

    /// Count one served prediction.
    pub fn inc_prediction(&self, churn: bool) {
        self.predictions_total.fetch_add(1, Ordering::Relaxed);
        if churn {
            self.churn_predictions.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "predictions_total", churn, "counter incremented");
    }

    pub fn add_unseen_categories(&self, n: u64) {
        if n > 0 {
            self.unseen_categories.fetch_add(n, Ordering::Relaxed);
            tracing::trace!(metric = "unseen_categories", n, "counter incremented");
        }
    }

    pub fn inc_not_ready(&self) {
        self.not_ready_rejections.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "not_ready_rejections", "counter incremented");
    }

    pub fn inc_models_loaded(&self) {
        self.models_loaded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "models_loaded", "counter incremented");
    }

    pub fn inc_evaluations(&self) {
        self.evaluations_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_run", "counter incremented");
    }

    pub fn inc_versions_staged(&self) {
        self.versions_staged.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "versions_staged", "counter incremented");
    }

    pub fn inc_promotions(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "promotions", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            predictions_total = self.predictions_total(),
            churn_predictions = self.churn_predictions(),
            unseen_categories = self.unseen_categories(),
            not_ready_rejections = self.not_ready_rejections(),
            models_loaded = self.models_loaded(),
            evaluations_run = self.evaluations_run(),
            versions_staged = self.versions_staged(),
            promotions = self.promotions(),
        );
    }

    pub fn predictions_total(&self) -> u64 {
        self.predictions_total.load(Ordering::Relaxed)
    }

    pub fn churn_predictions(&self) -> u64 {
        self.churn_predictions.load(Ordering::Relaxed)
    }

    pub fn unseen_categories(&self) -> u64 {
        self.unseen_categories.load(Ordering::Relaxed)
    }

    pub fn not_ready_rejections(&self) -> u64 {
        self.not_ready_rejections.load(Ordering::Relaxed)
    }

    pub fn models_loaded(&self) -> u64 {
        self.models_loaded.load(Ordering::Relaxed)
    }

    pub fn evaluations_run(&self) -> u64 {
        self.evaluations_run.load(Ordering::Relaxed)
    }

    pub fn versions_staged(&self) -> u64 {
        self.versions_staged.load(Ordering::Relaxed)
    }

    pub fn promotions(&self) -> u64 {
        self.promotions.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.predictions_total,
            &self.churn_predictions,
            &self.unseen_categories,
            &self.not_ready_rejections,
            &self.models_loaded,
            &self.evaluations_run,
            &self.versions_staged,
            &self.promotions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_counters_split_by_class() {
        let m = Metrics::new();
        m.inc_prediction(true);
        m.inc_prediction(false);
        m.inc_prediction(true);
        assert_eq!(m.predictions_total(), 3);
        assert_eq!(m.churn_predictions(), 2);
    }

    #[test]
    fn zero_unseen_is_not_counted() {
        let m = Metrics::new();
        m.add_unseen_categories(0);
        m.add_unseen_categories(2);
        assert_eq!(m.unseen_categories(), 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_prediction(true);
        m.inc_not_ready();
        m.inc_models_loaded();
        m.inc_evaluations();
        m.inc_versions_staged();
        m.inc_promotions();
        m.reset();
        assert_eq!(m.predictions_total(), 0);
        assert_eq!(m.churn_predictions(), 0);
        assert_eq!(m.not_ready_rejections(), 0);
        assert_eq!(m.models_loaded(), 0);
        assert_eq!(m.evaluations_run(), 0);
        assert_eq!(m.versions_staged(), 0);
        assert_eq!(m.promotions(), 0);
    }
}
