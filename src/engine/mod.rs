// Caller-facing engine: snapshots, live updates and reconciliation
pub mod aggregation;
pub mod cost;

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

pub use aggregation::{AggregationEngine, AggregationSnapshot, CountSource};
pub use cost::{CostConverter, CostEstimate, FixedRates, FxError, FxRates};

use crate::cache::TieredCache;
use crate::models::Conversation;
use crate::reconcile::{BatchReconciler, ReconcileHandle, ReconcileSettings, ViewContext};
use crate::segments::SegmentEstimator;
use crate::service::ConversationService;

/// Wires the cache, estimator, aggregation and reconciler together around
/// one shared [`TieredCache`]
#[derive(Debug, Clone)]
pub struct SegmentEngine {
    cache: Arc<TieredCache>,
    estimator: SegmentEstimator,
    aggregation: AggregationEngine,
    reconciler: Arc<BatchReconciler>,
}

impl SegmentEngine {
    pub fn new(
        cache: Arc<TieredCache>,
        service: Arc<dyn ConversationService>,
        estimator: SegmentEstimator,
        cost: CostConverter,
        settings: ReconcileSettings,
    ) -> Self {
        let reconciler = Arc::new(BatchReconciler::new(
            cache.clone(),
            service,
            estimator.clone(),
            settings,
        ));
        Self {
            aggregation: AggregationEngine::new(estimator.clone(), cost),
            cache,
            estimator,
            reconciler,
        }
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn reconciler(&self) -> &Arc<BatchReconciler> {
        &self.reconciler
    }

    pub fn snapshot(&self, conversations: &[Conversation]) -> AggregationSnapshot {
        self.aggregation.snapshot(conversations, &self.cache)
    }

    /// Write Quick estimates for every conversation without an Authoritative
    /// count. Returns how many were stored.
    pub fn prime_quick_estimates(&self, conversations: &[Conversation]) -> usize {
        conversations
            .iter()
            .filter(|c| !self.cache.has_authoritative(&c.id))
            .filter(|c| self.cache.put_quick(&c.id, self.estimator.estimate(c)))
            .count()
    }

    pub fn reconcile(&self, conversations: &[Conversation], context: ViewContext) -> ReconcileHandle {
        self.reconciler.reconcile(conversations, context)
    }

    pub fn reconcile_with_token(
        &self,
        conversations: &[Conversation],
        context: ViewContext,
        cancel: CancellationToken,
    ) -> ReconcileHandle {
        self.reconciler
            .reconcile_with_token(conversations, context, cancel)
    }

    /// Drop Quick estimates and recompute. Authoritative counts are kept.
    pub fn invalidate_and_recompute(&self, conversations: &[Conversation]) -> AggregationSnapshot {
        self.cache.invalidate_quick();
        self.snapshot(conversations)
    }

    /// Live snapshots for `conversations`, recomputed after every cache change
    /// until `cancel` fires or every receiver is dropped.
    pub fn watch(
        &self,
        conversations: Vec<Conversation>,
        cancel: CancellationToken,
    ) -> watch::Receiver<AggregationSnapshot> {
        let mut events = self.cache.subscribe();
        let (tx, rx) = watch::channel(self.snapshot(&conversations));
        let cache = self.cache.clone();
        let aggregation = self.aggregation.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tx.closed() => break,
                    event = events.recv() => event,
                };

                match event {
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "snapshot watcher lagged; recomputing");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                // Coalesce a burst of changes into one recomputation
                while let Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) = events.try_recv() {}

                if tx.send(aggregation.snapshot(&conversations, &cache)).is_err() {
                    break;
                }
            }
            tracing::trace!("snapshot watcher stopped");
        });

        rx
    }
}
