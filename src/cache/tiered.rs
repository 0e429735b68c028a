use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::record::{PersistedEntry, PersistedRecord};
use super::{CacheEvent, CacheStats, SegmentCacheEntry, Tier};
use crate::storage::{MemoryStore, PersistenceStore};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct CacheStore {
    quick: HashMap<String, SegmentCacheEntry>,
    authoritative: HashMap<String, SegmentCacheEntry>,
}

impl CacheStore {
    fn get(&self, id: &str) -> Option<&SegmentCacheEntry> {
        self.authoritative.get(id).or_else(|| self.quick.get(id))
    }

    /// Tier-priority insert. Returns false when a Quick write is rejected
    /// because the id already has an Authoritative count.
    fn insert(&mut self, entry: SegmentCacheEntry) -> bool {
        match entry.tier {
            Tier::Authoritative => {
                self.quick.remove(&entry.conversation_id);
                self.authoritative
                    .insert(entry.conversation_id.clone(), entry);
                true
            }
            Tier::Quick => {
                if self.authoritative.contains_key(&entry.conversation_id) {
                    return false;
                }
                self.quick.insert(entry.conversation_id.clone(), entry);
                true
            }
        }
    }

    /// Insert a persisted entry unless memory holds a newer one of the same tier
    fn merge(&mut self, entry: SegmentCacheEntry) -> bool {
        let same_tier = match entry.tier {
            Tier::Authoritative => &self.authoritative,
            Tier::Quick => &self.quick,
        };
        if same_tier
            .get(&entry.conversation_id)
            .is_some_and(|existing| existing.computed_at > entry.computed_at)
        {
            return false;
        }
        self.insert(entry)
    }
}

/// Two-tier segment count cache shared between the reconciler, the
/// interactive estimator and aggregation.
///
/// All access goes through a single `RwLock`; every mutation is announced on a
/// broadcast channel so snapshot consumers can recompute.
pub struct TieredCache {
    inner: RwLock<CacheStore>,
    store: Arc<dyn PersistenceStore>,
    ttl: Duration,
    events: broadcast::Sender<CacheEvent>,
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("stats", &self.stats())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TieredCache {
    pub fn new(store: Arc<dyn PersistenceStore>, ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: RwLock::new(CacheStore::default()),
            store,
            ttl,
            events,
        }
    }

    /// Cache with no durable backing
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryStore::new()), ttl)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Authoritative entry if present, else the Quick one
    pub fn get(&self, id: &str) -> Option<SegmentCacheEntry> {
        self.inner.read().get(id).cloned()
    }

    pub fn has_authoritative(&self, id: &str) -> bool {
        self.inner.read().authoritative.contains_key(id)
    }

    /// Store a quick estimate. Ignored when an Authoritative count exists.
    pub fn put_quick(&self, id: &str, segment_count: u32) -> bool {
        self.put(id, segment_count, Tier::Quick)
    }

    /// Store an authoritative count, superseding any Quick entry
    pub fn put_authoritative(&self, id: &str, segment_count: u32) -> bool {
        self.put(id, segment_count, Tier::Authoritative)
    }

    fn put(&self, id: &str, segment_count: u32, tier: Tier) -> bool {
        let entry = SegmentCacheEntry {
            conversation_id: id.to_string(),
            segment_count: segment_count.max(1),
            computed_at: Utc::now(),
            tier,
        };

        let accepted = self.inner.write().insert(entry);
        if accepted {
            self.notify(CacheEvent::Updated {
                id: id.to_string(),
                tier,
            });
        } else {
            tracing::trace!(id, "quick write ignored; authoritative count present");
        }
        accepted
    }

    /// Drop every Quick entry; Authoritative counts stay
    pub fn invalidate_quick(&self) -> usize {
        let removed = {
            let mut inner = self.inner.write();
            let removed = inner.quick.len();
            inner.quick.clear();
            removed
        };
        tracing::debug!(removed, "invalidated quick tier");
        self.notify(CacheEvent::QuickInvalidated { removed });
        removed
    }

    /// Drop both tiers in memory and the persisted record
    pub fn clear(&self) {
        *self.inner.write() = CacheStore::default();
        if let Err(e) = self.store.clear_record() {
            tracing::warn!(error = %e, "failed to clear persisted segment cache");
        }
        self.notify(CacheEvent::Cleared);
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        CacheStats {
            quick: inner.quick.len(),
            authoritative: inner.authoritative.len(),
        }
    }

    /// Merge the persisted record into memory, honoring TTL. Any read or
    /// parse failure leaves the cache as it was. Returns the entries applied.
    pub fn load(&self) -> usize {
        match self.read_live_entries(Utc::now()) {
            Ok(entries) => {
                let applied = {
                    let mut inner = self.inner.write();
                    entries.into_iter().filter(|e| inner.merge(e.clone())).count()
                };
                tracing::debug!(applied, "loaded segment cache");
                self.notify(CacheEvent::Loaded { entries: applied });
                applied
            }
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable segment cache record");
                0
            }
        }
    }

    fn read_live_entries(&self, now: DateTime<Utc>) -> Result<Vec<SegmentCacheEntry>> {
        let Some(raw) = self.store.load_record()? else {
            return Ok(Vec::new());
        };

        let record: PersistedRecord =
            serde_json::from_str(&raw).context("Failed to parse segment cache record")?;

        if record.is_expired(now, self.ttl) {
            tracing::debug!(
                last_persisted_at = %record.last_persisted_at,
                "segment cache record expired"
            );
        }
        Ok(record.into_live_entries(now, self.ttl))
    }

    /// Write the whole cache as one record. Failures are logged; the in-memory
    /// cache stays the source of truth either way.
    pub fn persist(&self) -> bool {
        let record = {
            let inner = self.inner.read();
            let entries: Vec<PersistedEntry> = inner
                .authoritative
                .values()
                .chain(inner.quick.values())
                .map(PersistedEntry::from)
                .collect();
            PersistedRecord::new(entries, Utc::now())
        };

        let result = serde_json::to_string(&record)
            .context("Failed to serialize segment cache")
            .and_then(|payload| self.store.save_record(&payload));

        match result {
            Ok(()) => {
                tracing::debug!(entries = record.entries.len(), "persisted segment cache");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist segment cache");
                false
            }
        }
    }

    fn notify(&self, event: CacheEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
