use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{SegmentCacheEntry, Tier};

/// On-disk shape of one cached count
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntry {
    pub id: String,
    pub segment_count: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub computed_at: DateTime<Utc>,
    // Older records carry no tier; anything persisted came from the authoritative path
    #[serde(default = "legacy_tier")]
    pub tier: Tier,
}

fn legacy_tier() -> Tier {
    Tier::Authoritative
}

/// The whole cache as written to the persistence boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    pub entries: Vec<PersistedEntry>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_persisted_at: DateTime<Utc>,
}

impl PersistedRecord {
    pub fn new(entries: Vec<PersistedEntry>, last_persisted_at: DateTime<Utc>) -> Self {
        Self {
            entries,
            last_persisted_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.last_persisted_at) > ttl
    }

    /// Entries still usable at `now`: none if the record itself is stale,
    /// otherwise only the ones individually younger than `ttl`.
    pub fn into_live_entries(self, now: DateTime<Utc>, ttl: Duration) -> Vec<SegmentCacheEntry> {
        if self.is_expired(now, ttl) {
            return Vec::new();
        }

        self.entries
            .into_iter()
            .filter(|e| e.segment_count >= 1)
            .filter(|e| now.signed_duration_since(e.computed_at) <= ttl)
            .map(|e| SegmentCacheEntry {
                conversation_id: e.id,
                segment_count: e.segment_count,
                computed_at: e.computed_at,
                tier: e.tier,
            })
            .collect()
    }
}

impl From<&SegmentCacheEntry> for PersistedEntry {
    fn from(entry: &SegmentCacheEntry) -> Self {
        Self {
            id: entry.conversation_id.clone(),
            segment_count: entry.segment_count,
            computed_at: entry.computed_at,
            tier: entry.tier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, age_hours: i64, now: DateTime<Utc>) -> PersistedEntry {
        PersistedEntry {
            id: id.to_string(),
            segment_count: 2,
            computed_at: now - Duration::hours(age_hours),
            tier: Tier::Authoritative,
        }
    }

    #[test]
    fn test_record_serializes_epoch_millis_camel_case() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let record = PersistedRecord::new(
            vec![PersistedEntry {
                id: "c1".to_string(),
                segment_count: 3,
                computed_at: at,
                tier: Tier::Quick,
            }],
            at,
        );

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""segmentCount":3"#));
        assert!(json.contains(r#""computedAt":1700000000123"#));
        assert!(json.contains(r#""lastPersistedAt":1700000000123"#));
        assert!(json.contains(r#""tier":"quick""#));
    }

    #[test]
    fn test_legacy_entry_without_tier_is_authoritative() {
        let json = r#"{"entries":[{"id":"c1","segmentCount":4,"computedAt":1700000000000}],"lastPersistedAt":1700000000000}"#;
        let record: PersistedRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.entries[0].tier, Tier::Authoritative);
    }

    #[test]
    fn test_stale_record_yields_nothing() {
        let now = Utc::now();
        let record = PersistedRecord::new(vec![entry("c1", 1, now)], now - Duration::hours(13));
        assert!(record.is_expired(now, Duration::hours(12)));
        assert!(record.into_live_entries(now, Duration::hours(12)).is_empty());
    }

    #[test]
    fn test_fresh_record_filters_old_entries() {
        let now = Utc::now();
        let record = PersistedRecord::new(
            vec![entry("fresh", 1, now), entry("old", 14, now), entry("edge", 11, now)],
            now - Duration::hours(1),
        );

        let ids: Vec<String> = record
            .into_live_entries(now, Duration::hours(12))
            .into_iter()
            .map(|e| e.conversation_id)
            .collect();
        assert_eq!(ids, vec!["fresh".to_string(), "edge".to_string()]);
    }

    #[test]
    fn test_zero_count_entries_are_dropped() {
        let now = Utc::now();
        let mut bad = entry("bad", 0, now);
        bad.segment_count = 0;
        let record = PersistedRecord::new(vec![bad], now);
        assert!(record.into_live_entries(now, Duration::hours(12)).is_empty());
    }
}
