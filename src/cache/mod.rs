// Two-tier segment cache
pub mod record;
pub mod tiered;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use record::{PersistedEntry, PersistedRecord};
pub use tiered::TieredCache;

/// Where a cached count came from. Authoritative always outranks Quick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Quick,
    Authoritative,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentCacheEntry {
    pub conversation_id: String,
    pub segment_count: u32,
    pub computed_at: DateTime<Utc>,
    pub tier: Tier,
}

/// Published after every accepted cache mutation
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    Updated { id: String, tier: Tier },
    QuickInvalidated { removed: usize },
    Loaded { entries: usize },
    Cleared,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub quick: usize,
    pub authoritative: usize,
}
