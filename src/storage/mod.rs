// Persistence boundary for the segment cache
pub mod json_file;
pub mod migrations;
pub mod sqlite;

use anyhow::Result;
use parking_lot::Mutex;

pub use json_file::JsonFileStore;
pub use sqlite::{Database, SqliteStore};

/// Durable key-value slot holding one opaque cache record
///
/// Implementations replace the whole record on every save; there are no
/// partial-field updates.
pub trait PersistenceStore: Send + Sync {
    fn load_record(&self) -> Result<Option<String>>;
    fn save_record(&self, record: &str) -> Result<()>;
    fn clear_record(&self) -> Result<()>;
}

/// Process-local store, used when nothing durable is configured and in tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: impl Into<String>) -> Self {
        Self {
            record: Mutex::new(Some(record.into())),
        }
    }

    pub fn snapshot(&self) -> Option<String> {
        self.record.lock().clone()
    }
}

impl PersistenceStore for MemoryStore {
    fn load_record(&self) -> Result<Option<String>> {
        Ok(self.record.lock().clone())
    }

    fn save_record(&self, record: &str) -> Result<()> {
        *self.record.lock() = Some(record.to_string());
        Ok(())
    }

    fn clear_record(&self) -> Result<()> {
        *self.record.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.load_record().unwrap().is_none());

        store.save_record("payload").unwrap();
        assert_eq!(store.load_record().unwrap().as_deref(), Some("payload"));

        store.clear_record().unwrap();
        assert!(store.snapshot().is_none());
    }
}
