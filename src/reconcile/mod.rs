// Background reconciliation of quick estimates into authoritative counts
pub mod batch;
pub mod inflight;
pub mod progress;

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use batch::BatchReconciler;
pub use inflight::{InFlightGuard, InFlightSet};
pub use progress::{ReconcileOutcome, ReconcileProgress, ReconcileReport};

use crate::config::ReconcileConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileSettings {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Most reconciliation targets plausible for one day of conversations
    pub per_day_limit: usize,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay: Duration::from_millis(100),
            max_attempts: 3,
            base_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(8000),
            per_day_limit: 150,
        }
    }
}

impl From<&ReconcileConfig> for ReconcileSettings {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            per_day_limit: config.per_day_limit,
        }
    }
}

/// The time span the caller is looking at, used to size the safety valve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewContext {
    SingleDay,
    Days(u32),
    /// No lower date bound, so no size is implausible
    Unbounded,
}

impl ViewContext {
    /// Largest candidate set considered plausible, `None` for no limit
    pub fn candidate_limit(&self, per_day_limit: usize) -> Option<usize> {
        match self {
            ViewContext::SingleDay => Some(per_day_limit),
            ViewContext::Days(days) => Some(per_day_limit.saturating_mul((*days).max(1) as usize)),
            ViewContext::Unbounded => None,
        }
    }
}

/// `min(base * 2^attempt, max)`
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

/// Running reconciliation pass: progress stream, completion and cancellation
#[derive(Debug)]
pub struct ReconcileHandle {
    progress: mpsc::UnboundedReceiver<ReconcileProgress>,
    cancel: CancellationToken,
    task: JoinHandle<ReconcileReport>,
}

impl ReconcileHandle {
    pub(crate) fn new(
        progress: mpsc::UnboundedReceiver<ReconcileProgress>,
        cancel: CancellationToken,
        task: JoinHandle<ReconcileReport>,
    ) -> Self {
        Self {
            progress,
            cancel,
            task,
        }
    }

    /// Stop scheduling new batches; fetches already running still finish
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Next progress update, `None` once the pass has finished
    pub async fn next_progress(&mut self) -> Option<ReconcileProgress> {
        self.progress.recv().await
    }

    /// Wait for the pass to finish
    pub async fn wait(self) -> ReconcileReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "reconciliation task failed");
                ReconcileReport {
                    outcome: ReconcileOutcome::Aborted {
                        diagnostic: format!("reconciliation task failed: {e}"),
                    },
                    progress: ReconcileProgress::default(),
                    elapsed: Duration::ZERO,
                }
            }
        }
    }
}
