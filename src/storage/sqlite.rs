use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use crate::storage::PersistenceStore;
use crate::storage::migrations::apply_migrations;

pub struct Database {
    connection: Mutex<Connection>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("connection", &"<SQLite Connection>")
            .finish()
    }
}

impl Database {
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let connection = Connection::open(path)
            .with_context(|| format!("Failed to open database at: {}", path.display()))?;

        connection
            .execute_batch(
                "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = memory;
        ",
            )
            .context("Failed to configure SQLite pragmas")?;

        let db = Database {
            connection: Mutex::new(connection),
        };
        db.init_schema()?;

        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Database {
            connection: Mutex::new(connection),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn init_schema(&self) -> Result<()> {
        apply_migrations(&self.connection.lock()).context("Failed to apply database migrations")
    }

    // Exchange rate management methods
    pub fn get_exchange_rate(
        &self,
        base_currency: &str,
        target_currency: &str,
    ) -> Result<Option<(f64, String)>> {
        let connection = self.connection.lock();
        connection
            .query_row(
                "SELECT rate, fetched_at FROM exchange_rates WHERE base_currency = ?1 AND target_currency = ?2",
                [base_currency, target_currency],
                |row| Ok((row.get::<_, f64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .context("Failed to query exchange rate")
    }

    pub fn save_exchange_rate(
        &self,
        base_currency: &str,
        target_currency: &str,
        rate: f64,
        fetched_at: &str,
    ) -> Result<()> {
        self.connection
            .lock()
            .execute(
                "INSERT OR REPLACE INTO exchange_rates (base_currency, target_currency, rate, fetched_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![base_currency, target_currency, rate, fetched_at],
            )
            .context("Failed to save exchange rate")?;

        Ok(())
    }

    pub fn cleanup_exchange_rates(&self, cutoff_time: &str) -> Result<usize> {
        let rows_affected = self
            .connection
            .lock()
            .execute("DELETE FROM exchange_rates WHERE fetched_at < ?1", [cutoff_time])
            .context("Failed to cleanup exchange rates")?;

        Ok(rows_affected)
    }

    // Segment cache record methods
    pub fn get_cache_record(&self, scope: &str) -> Result<Option<String>> {
        self.connection
            .lock()
            .query_row(
                "SELECT payload FROM segment_cache_records WHERE scope = ?1",
                [scope],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .context("Failed to read segment cache record")
    }

    /// Replaces the whole record for a scope in a single statement
    pub fn put_cache_record(&self, scope: &str, payload: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection
            .lock()
            .execute(
                "INSERT OR REPLACE INTO segment_cache_records (scope, payload, updated_at) VALUES (?1, ?2, ?3)",
                [scope, payload, now.as_str()],
            )
            .context("Failed to write segment cache record")?;

        Ok(())
    }

    pub fn delete_cache_record(&self, scope: &str) -> Result<bool> {
        let rows_affected = self
            .connection
            .lock()
            .execute("DELETE FROM segment_cache_records WHERE scope = ?1", [scope])
            .context("Failed to delete segment cache record")?;

        Ok(rows_affected > 0)
    }
}

/// Persistence boundary backed by the SQLite database, one row per scope
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
    scope: String,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>, scope: impl Into<String>) -> Self {
        Self {
            db,
            scope: scope.into(),
        }
    }
}

impl PersistenceStore for SqliteStore {
    fn load_record(&self) -> Result<Option<String>> {
        self.db.get_cache_record(&self.scope)
    }

    fn save_record(&self, record: &str) -> Result<()> {
        self.db.put_cache_record(&self.scope, record)
    }

    fn clear_record(&self) -> Result<()> {
        self.db.delete_cache_record(&self.scope)?;
        Ok(())
    }
}
