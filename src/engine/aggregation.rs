use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use super::cost::CostConverter;
use crate::cache::{TieredCache, Tier};
use crate::models::Conversation;
use crate::segments::SegmentEstimator;

/// Where a conversation's count in a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountSource {
    Authoritative,
    Quick,
    /// Estimated on the spot, not cached
    Fallback,
}

/// Consistent totals over one conversation set at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationSnapshot {
    pub total_segments: u64,
    pub total_cost: f64,
    pub currency: String,
    pub cost_converted: bool,
    pub accurate_count: usize,
    pub fallback_count: usize,
    pub per_conversation: BTreeMap<String, u32>,
    pub sources: BTreeMap<String, CountSource>,
}

impl AggregationSnapshot {
    pub fn empty(currency: impl Into<String>) -> Self {
        Self {
            total_segments: 0,
            total_cost: 0.0,
            currency: currency.into(),
            cost_converted: true,
            accurate_count: 0,
            fallback_count: 0,
            per_conversation: BTreeMap::new(),
            sources: BTreeMap::new(),
        }
    }

    pub fn conversation_count(&self) -> usize {
        self.per_conversation.len()
    }

    /// Share of conversations backed by a cached count
    pub fn accuracy(&self) -> f64 {
        let total = self.accurate_count + self.fallback_count;
        if total == 0 {
            1.0
        } else {
            self.accurate_count as f64 / total as f64
        }
    }
}

/// Builds snapshots from the cache, estimating whatever is missing
#[derive(Debug, Clone)]
pub struct AggregationEngine {
    estimator: SegmentEstimator,
    cost: CostConverter,
}

impl AggregationEngine {
    pub fn new(estimator: SegmentEstimator, cost: CostConverter) -> Self {
        Self { estimator, cost }
    }

    /// Recompute totals from scratch. Never writes to the cache.
    pub fn snapshot(&self, conversations: &[Conversation], cache: &TieredCache) -> AggregationSnapshot {
        let mut snapshot = AggregationSnapshot::empty(self.cost.target_currency());
        let mut seen = HashSet::new();

        for conversation in conversations {
            if !seen.insert(conversation.id.as_str()) {
                continue;
            }

            let (count, source) = match cache.get(&conversation.id) {
                Some(entry) => {
                    snapshot.accurate_count += 1;
                    let source = match entry.tier {
                        Tier::Authoritative => CountSource::Authoritative,
                        Tier::Quick => CountSource::Quick,
                    };
                    (entry.segment_count, source)
                }
                None => {
                    snapshot.fallback_count += 1;
                    (self.estimator.estimate(conversation), CountSource::Fallback)
                }
            };

            snapshot.total_segments += u64::from(count);
            snapshot
                .per_conversation
                .insert(conversation.id.clone(), count);
            snapshot.sources.insert(conversation.id.clone(), source);
        }

        // Priced once over the aggregate so rounding does not compound
        let cost = self.cost.to_cost(snapshot.total_segments);
        snapshot.total_cost = cost.amount;
        snapshot.currency = cost.currency;
        snapshot.cost_converted = cost.converted;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cost::FixedRates;
    use crate::models::{Message, SegmentPricing};
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn engine() -> AggregationEngine {
        AggregationEngine::new(
            SegmentEstimator::default(),
            CostConverter::base_only(SegmentPricing::default()),
        )
    }

    fn cache() -> TieredCache {
        TieredCache::in_memory(Duration::hours(12))
    }

    #[test]
    fn test_empty_list_is_all_zero() {
        let snapshot = engine().snapshot(&[], &cache());

        assert_eq!(snapshot.total_segments, 0);
        assert_eq!(snapshot.total_cost, 0.0);
        assert_eq!(snapshot.accurate_count, 0);
        assert_eq!(snapshot.fallback_count, 0);
        assert!(snapshot.per_conversation.is_empty());
    }

    #[test]
    fn test_transcript_only_conversation_is_fallback() {
        let cache = cache();
        let conv = Conversation::new("c1", Utc::now()).with_transcript("Hello world");

        let snapshot = engine().snapshot(&[conv], &cache);

        assert_eq!(snapshot.fallback_count, 1);
        assert_eq!(snapshot.accurate_count, 0);
        assert_eq!(snapshot.total_segments, 1);
        assert_eq!(snapshot.sources["c1"], CountSource::Fallback);
        // Aggregation does not write its estimates back
        assert!(cache.get("c1").is_none());
    }

    #[test]
    fn test_cached_counts_preferred() {
        let cache = cache();
        cache.put_quick("c1", 2);
        cache.put_authoritative("c2", 5);
        cache.put_quick("c2", 1);
        let now = Utc::now();
        let convs = vec![
            Conversation::new("c1", now).with_transcript("hi"),
            Conversation::new("c2", now).with_transcript("hi"),
            Conversation::new("c3", now).with_messages(vec![Message::new("a".repeat(161))]),
        ];

        let snapshot = engine().snapshot(&convs, &cache);

        assert_eq!(snapshot.per_conversation["c1"], 2);
        assert_eq!(snapshot.per_conversation["c2"], 5);
        assert_eq!(snapshot.per_conversation["c3"], 2);
        assert_eq!(snapshot.sources["c2"], CountSource::Authoritative);
        assert_eq!(snapshot.accurate_count, 2);
        assert_eq!(snapshot.fallback_count, 1);
        assert_eq!(snapshot.total_segments, 9);
    }

    #[test]
    fn test_totals_match_breakdown() {
        let cache = cache();
        let now = Utc::now();
        let convs: Vec<Conversation> = (0..20)
            .map(|i| Conversation::new(format!("c{i}"), now).with_transcript("x".repeat(i * 37)))
            .collect();
        for conv in convs.iter().step_by(3) {
            cache.put_authoritative(&conv.id, 4);
        }

        let snapshot = engine().snapshot(&convs, &cache);

        let sum: u64 = snapshot.per_conversation.values().map(|c| u64::from(*c)).sum();
        assert_eq!(snapshot.total_segments, sum);
        assert_eq!(snapshot.accurate_count + snapshot.fallback_count, convs.len());
    }

    #[test]
    fn test_duplicate_ids_counted_once() {
        let now = Utc::now();
        let convs = vec![
            Conversation::new("c1", now).with_transcript("first"),
            Conversation::new("c1", now).with_transcript("x".repeat(500)),
        ];

        let snapshot = engine().snapshot(&convs, &cache());

        assert_eq!(snapshot.conversation_count(), 1);
        assert_eq!(snapshot.total_segments, 1);
        assert_eq!(snapshot.fallback_count, 1);
    }

    #[test]
    fn test_cost_priced_on_aggregate() {
        let cache = cache();
        for i in 0..3 {
            cache.put_authoritative(&format!("c{i}"), 1);
        }
        let rates = FixedRates::new().with_rate("USD", "EUR", 0.5);
        let engine = AggregationEngine::new(
            SegmentEstimator::default(),
            CostConverter::new(SegmentPricing::default(), "EUR", Arc::new(rates)),
        );
        let now = Utc::now();
        let convs: Vec<Conversation> = (0..3).map(|i| Conversation::new(format!("c{i}"), now)).collect();

        let snapshot = engine.snapshot(&convs, &cache);

        assert!((snapshot.total_cost - 3.0 * 0.0083 * 0.5).abs() < 1e-12);
        assert_eq!(snapshot.currency, "EUR");
        assert!(snapshot.cost_converted);
    }

    #[test]
    fn test_fx_failure_flags_snapshot() {
        let engine = AggregationEngine::new(
            SegmentEstimator::default(),
            CostConverter::new(SegmentPricing::default(), "GBP", Arc::new(FixedRates::new())),
        );
        let convs = vec![Conversation::new("c1", Utc::now())];

        let snapshot = engine.snapshot(&convs, &cache());

        assert_eq!(snapshot.currency, "USD");
        assert!(!snapshot.cost_converted);
        assert!((snapshot.total_cost - 0.0083).abs() < 1e-12);
    }
}
