use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::storage::PersistenceStore;

/// Persistence boundary backed by a single JSON file
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// reader never observes a half-written record.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistenceStore for JsonFileStore {
    fn load_record(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read cache file: {}", self.path.display()))?;
        Ok(Some(contents))
    }

    fn save_record(&self, record: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, record)
            .with_context(|| format!("Failed to write cache file: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace cache file: {}", self.path.display()))?;

        Ok(())
    }

    fn clear_record(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove cache file: {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("segments.json"));
        assert!(store.load_record().unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_whole_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("cache").join("segments.json"));

        store.save_record(r#"{"entries":[1,2,3]}"#).unwrap();
        store.save_record(r#"{"entries":[]}"#).unwrap();

        assert_eq!(store.load_record().unwrap().as_deref(), Some(r#"{"entries":[]}"#));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_clear_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("segments.json"));

        store.save_record("{}").unwrap();
        store.clear_record().unwrap();
        assert!(!store.path().exists());
        store.clear_record().unwrap();
    }
}
