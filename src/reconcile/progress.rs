use serde::Serialize;
use std::time::Duration;

/// Running totals for one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileProgress {
    pub completed: usize,
    pub total: usize,
    pub cache_hits: usize,
    pub new_calculations: usize,
    pub failed: usize,
    pub skipped_in_flight: usize,
    pub degraded_batches: usize,
    pub batches_done: usize,
    pub batches_total: usize,
}

impl ReconcileProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

impl std::fmt::Display for ReconcileProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} {:.0}% (cache hits: {}, new: {}, failed: {}, degraded batches: {})",
            self.completed,
            self.total,
            self.fraction() * 100.0,
            self.cache_hits,
            self.new_calculations,
            self.failed,
            self.degraded_batches
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Completed,
    Cancelled,
    /// Safety valve tripped; nothing was fetched
    Aborted { diagnostic: String },
    /// The conversation service cannot be used as configured
    ConfigurationError { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub outcome: ReconcileOutcome,
    pub progress: ReconcileProgress,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ReconcileReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == ReconcileOutcome::Completed
    }
}
