use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use super::inflight::{InFlightGuard, InFlightSet};
use super::progress::{ReconcileOutcome, ReconcileProgress, ReconcileReport};
use super::{ReconcileHandle, ReconcileSettings, ViewContext, backoff_delay};
use crate::cache::TieredCache;
use crate::models::Conversation;
use crate::segments::SegmentEstimator;
use crate::service::{ConversationService, ServiceError};

#[derive(Debug, Default)]
struct BatchResult {
    cache_hits: usize,
    new_calculations: usize,
    failed: usize,
    skipped_in_flight: usize,
    degraded: bool,
    configuration_error: Option<String>,
}

impl BatchResult {
    fn resolved(&self) -> usize {
        self.cache_hits + self.new_calculations + self.failed + self.skipped_in_flight
    }
}

/// Fills in Authoritative cache entries from the conversation service
///
/// Conversations are fetched in fixed-size concurrent batches with a pause
/// between batches. A batch that gets rate limited retries the throttled ids
/// with exponential backoff before it is reported degraded. One reconciler
/// may run several passes at once; they share the in-flight set.
pub struct BatchReconciler {
    cache: Arc<TieredCache>,
    service: Arc<dyn ConversationService>,
    estimator: SegmentEstimator,
    settings: ReconcileSettings,
    in_flight: InFlightSet,
}

impl std::fmt::Debug for BatchReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchReconciler")
            .field("settings", &self.settings)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl BatchReconciler {
    pub fn new(
        cache: Arc<TieredCache>,
        service: Arc<dyn ConversationService>,
        estimator: SegmentEstimator,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            cache,
            service,
            estimator,
            settings,
            in_flight: InFlightSet::new(),
        }
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Start a background pass over `conversations`
    pub fn reconcile(self: &Arc<Self>, conversations: &[Conversation], context: ViewContext) -> ReconcileHandle {
        self.reconcile_with_token(conversations, context, CancellationToken::new())
    }

    /// Start a background pass that stops scheduling work once `cancel` fires
    pub fn reconcile_with_token(
        self: &Arc<Self>,
        conversations: &[Conversation],
        context: ViewContext,
        cancel: CancellationToken,
    ) -> ReconcileHandle {
        let ids = unique_ids(conversations);
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let this = Arc::clone(self);
        let token = cancel.clone();

        let task = tokio::spawn(async move { this.run(ids, context, progress_tx, token).await });
        ReconcileHandle::new(progress_rx, cancel, task)
    }

    /// Run one pass to completion on the current task
    pub async fn run(
        &self,
        ids: Vec<String>,
        context: ViewContext,
        progress_tx: mpsc::UnboundedSender<ReconcileProgress>,
        cancel: CancellationToken,
    ) -> ReconcileReport {
        let started = Instant::now();
        let mut progress = ReconcileProgress {
            total: ids.len(),
            ..Default::default()
        };

        let (hits, candidates): (Vec<String>, Vec<String>) =
            ids.into_iter().partition(|id| self.cache.has_authoritative(id));
        progress.cache_hits = hits.len();
        progress.completed = hits.len();

        if let Some(limit) = context.candidate_limit(self.settings.per_day_limit) {
            if candidates.len() > limit {
                tracing::error!(
                    candidates = candidates.len(),
                    limit,
                    ?context,
                    "reconciliation safety valve tripped"
                );
                let diagnostic = format!(
                    "{} conversations need reconciliation but at most {} are plausible for a {:?} view; \
                     check the caller's date filtering",
                    candidates.len(),
                    limit,
                    context
                );
                let _ = progress_tx.send(progress.clone());
                return ReconcileReport {
                    outcome: ReconcileOutcome::Aborted { diagnostic },
                    progress,
                    elapsed: started.elapsed(),
                };
            }
        }

        let batch_size = self.settings.batch_size.max(1);
        progress.batches_total = candidates.len().div_ceil(batch_size);
        let _ = progress_tx.send(progress.clone());

        tracing::info!(
            total = progress.total,
            cache_hits = progress.cache_hits,
            candidates = candidates.len(),
            batches = progress.batches_total,
            "starting reconciliation pass"
        );

        let mut outcome = ReconcileOutcome::Completed;
        for (index, batch) in candidates.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                outcome = ReconcileOutcome::Cancelled;
                break;
            }

            if index > 0 && !self.settings.batch_delay.is_zero() {
                let cancelled = tokio::select! {
                    _ = cancel.cancelled() => true,
                    _ = sleep(self.settings.batch_delay) => false,
                };
                if cancelled {
                    outcome = ReconcileOutcome::Cancelled;
                    break;
                }
            }

            let result = self.process_batch(batch, &cancel).await;
            progress.cache_hits += result.cache_hits;
            progress.new_calculations += result.new_calculations;
            progress.failed += result.failed;
            progress.skipped_in_flight += result.skipped_in_flight;
            progress.completed += result.resolved();
            progress.batches_done += 1;
            if result.degraded {
                progress.degraded_batches += 1;
            }
            let _ = progress_tx.send(progress.clone());

            if let Some(message) = result.configuration_error {
                outcome = ReconcileOutcome::ConfigurationError { message };
                break;
            }
        }

        let elapsed = started.elapsed();
        tracing::info!(
            ?outcome,
            completed = progress.completed,
            new_calculations = progress.new_calculations,
            failed = progress.failed,
            degraded_batches = progress.degraded_batches,
            elapsed_ms = elapsed.as_millis() as u64,
            "reconciliation pass finished"
        );

        ReconcileReport {
            outcome,
            progress,
            elapsed,
        }
    }

    async fn process_batch(&self, ids: &[String], cancel: &CancellationToken) -> BatchResult {
        let mut result = BatchResult::default();
        let mut pending: Vec<InFlightGuard> = Vec::with_capacity(ids.len());

        for id in ids {
            // Another pass may have finished this id since the pass started
            if self.cache.has_authoritative(id) {
                result.cache_hits += 1;
                continue;
            }
            match self.in_flight.try_claim(id) {
                Some(guard) => pending.push(guard),
                None => {
                    tracing::debug!(id = id.as_str(), "already in flight; skipping");
                    result.skipped_in_flight += 1;
                }
            }
        }

        let mut attempt = 0u32;
        while !pending.is_empty() {
            let outcomes = join_all(
                std::mem::take(&mut pending)
                    .into_iter()
                    .map(|guard| self.fetch_one(guard)),
            )
            .await;

            let mut rate_limited = Vec::new();
            let mut retry_after: Option<Duration> = None;
            for (guard, outcome) in outcomes {
                match outcome {
                    Ok(_) => result.new_calculations += 1,
                    Err(ServiceError::RateLimited { retry_after: hint }) => {
                        retry_after = retry_after.max(hint);
                        rate_limited.push(guard);
                    }
                    Err(ServiceError::Configuration(message)) => {
                        tracing::error!(id = guard.id(), error = %message, "conversation service misconfigured");
                        result.failed += 1;
                        result.configuration_error.get_or_insert(message);
                    }
                    Err(e) => {
                        tracing::warn!(id = guard.id(), error = %e, "failed to fetch conversation; left for a later pass");
                        result.failed += 1;
                    }
                }
            }

            if rate_limited.is_empty() {
                break;
            }
            if result.configuration_error.is_some() {
                result.failed += rate_limited.len();
                break;
            }
            if attempt + 1 >= self.settings.max_attempts {
                tracing::warn!(
                    attempts = attempt + 1,
                    rate_limited = rate_limited.len(),
                    "rate limit retries exhausted; batch degraded"
                );
                result.degraded = true;
                result.failed += rate_limited.len();
                break;
            }

            let delay = backoff_delay(attempt, self.settings.base_backoff, self.settings.max_backoff)
                .max(retry_after.unwrap_or_default())
                .min(self.settings.max_backoff);
            tracing::warn!(
                attempt = attempt + 1,
                max_attempts = self.settings.max_attempts,
                delay_ms = delay.as_millis() as u64,
                rate_limited = rate_limited.len(),
                "rate limited; backing off"
            );

            let cancelled = tokio::select! {
                _ = cancel.cancelled() => true,
                _ = sleep(delay) => false,
            };
            if cancelled {
                result.failed += rate_limited.len();
                break;
            }

            attempt += 1;
            pending = rate_limited;
        }

        result
    }

    async fn fetch_one(&self, guard: InFlightGuard) -> (InFlightGuard, Result<u32, ServiceError>) {
        let result = match self.service.fetch_full_conversation(guard.id()).await {
            Ok(fetched) => {
                let count = self.estimator.estimate_authoritative(&fetched.messages);
                self.cache.put_authoritative(guard.id(), count);
                Ok(count)
            }
            Err(e) => Err(e),
        };
        (guard, result)
    }
}

/// Conversation ids in input order, duplicates removed
pub fn unique_ids(conversations: &[Conversation]) -> Vec<String> {
    let mut seen = HashSet::new();
    conversations
        .iter()
        .filter(|c| seen.insert(c.id.as_str()))
        .map(|c| c.id.clone())
        .collect()
}
