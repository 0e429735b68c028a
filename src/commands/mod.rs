// Command handlers module
pub mod cache;
pub mod config;
pub mod invalidate;
pub mod reconcile;
pub mod snapshot;

use anyhow::{Context, Result};
use chrono::Duration;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::TieredCache;
use crate::cli::Cli;
use crate::config::Config;
use crate::engine::{CostConverter, FixedRates, SegmentEngine};
use crate::models::{Conversation, CurrencyConverter, SegmentPricing};
use crate::reconcile::{ReconcileHandle, ReconcileProgress, ReconcileSettings};
use crate::segments::SegmentEstimator;
use crate::service::HttpConversationService;
use crate::storage::{Database, JsonFileStore, PersistenceStore, SqliteStore};
use crate::utils::{TimeWindow, TimezoneCalculator, WindowSpec};

pub use cache::handle_cache_action;
pub use config::handle_config_action;
pub use invalidate::handle_invalidate_command;
pub use reconcile::handle_reconcile_command;
pub use snapshot::handle_snapshot_command;

/// Resolved configuration and output preferences for one invocation
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub currency: String,
    pub json: bool,
    pub styled: bool,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config_path = match &cli.config {
            Some(path) => PathBuf::from(path),
            None => Config::default_path()?,
        };
        let mut config = Config::load_from(&config_path)?;

        // CLI overrides take precedence
        if let Some(timezone) = &cli.timezone {
            config.timezone.timezone = timezone.clone();
        }
        let currency = cli
            .currency
            .clone()
            .unwrap_or_else(|| config.currency.default_currency.clone())
            .to_uppercase();

        Ok(Self {
            styled: cli.colored || config.output.colored,
            config,
            config_path,
            currency,
            json: cli.json,
        })
    }

    /// Directory holding the cache database and cache file
    pub fn data_dir(&self) -> PathBuf {
        self.config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn database(&self) -> Result<Arc<Database>> {
        let path = self.data_dir().join("cache.db");
        Ok(Arc::new(Database::new(&path)?))
    }

    pub fn open_cache(&self, db: &Arc<Database>) -> Result<Arc<TieredCache>> {
        let scope = self.config.cache.scope.clone();
        let store: Arc<dyn PersistenceStore> = match self.config.cache.backend.as_str() {
            "sqlite" => Arc::new(SqliteStore::new(db.clone(), scope)),
            "json" => Arc::new(JsonFileStore::new(
                self.data_dir().join(format!("segment_cache_{scope}.json")),
            )),
            other => anyhow::bail!("Unknown cache backend '{}'. Must be 'sqlite' or 'json'", other),
        };
        let ttl = Duration::hours(i64::from(self.config.cache.ttl_hours));

        let cache = Arc::new(TieredCache::new(store, ttl));
        cache.load();
        Ok(cache)
    }

    pub fn window(&self, spec: &WindowSpec) -> Result<TimeWindow> {
        let calc = TimezoneCalculator::new(
            &self.config.timezone.timezone,
            self.config.timezone.daily_cutoff_hour,
        )?;
        TimeWindow::resolve(spec, &calc, chrono::Utc::now())
    }

    /// Cost converter for the display currency. A rate that cannot be
    /// fetched leaves costs in the base currency.
    pub async fn cost_converter(&self, db: &Arc<Database>) -> CostConverter {
        let pricing = SegmentPricing::new(
            self.config.pricing.unit_price,
            self.config.pricing.base_currency.clone(),
        );

        let rates = match CurrencyConverter::new(db.clone(), self.config.currency.cache_ttl_hours) {
            Ok(converter) => converter
                .resolve_rates(&pricing.base_currency, &self.currency)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, currency = %self.currency, "exchange rate unavailable");
                    FixedRates::new()
                }),
            Err(e) => {
                tracing::warn!(error = %e, "currency converter unavailable");
                FixedRates::new()
            }
        };

        CostConverter::new(pricing, self.currency.clone(), Arc::new(rates))
    }

    pub async fn engine(&self) -> Result<SegmentEngine> {
        let db = self.database()?;
        let cache = self.open_cache(&db)?;
        let service = HttpConversationService::from_config(&self.config.service)?;
        let cost = self.cost_converter(&db).await;

        Ok(SegmentEngine::new(
            cache,
            Arc::new(service),
            SegmentEstimator::default(),
            cost,
            ReconcileSettings::from(&self.config.reconcile),
        ))
    }
}

/// Read a JSON array of conversations
pub fn load_conversations(path: &Path) -> Result<Vec<Conversation>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read conversations file: {}", path.display()))?;
    let conversations: Vec<Conversation> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse conversations file: {}", path.display()))?;

    tracing::debug!(count = conversations.len(), path = %path.display(), "loaded conversations");
    Ok(conversations)
}

/// Conversations from `path` that fall inside the requested window
pub fn load_window(ctx: &AppContext, path: &str, spec: &WindowSpec) -> Result<(Vec<Conversation>, TimeWindow)> {
    let window = ctx.window(spec)?;
    let conversations = window.filter(load_conversations(Path::new(path))?);
    Ok((conversations, window))
}

/// Drain progress updates to stderr until the pass ends. Ctrl-C cancels the
/// pass; fetches already running still complete.
pub async fn follow_progress(handle: &mut ReconcileHandle, quiet: bool) {
    loop {
        tokio::select! {
            progress = handle.next_progress() => match progress {
                Some(progress) => report_progress(&progress, quiet),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received; cancelling reconciliation");
                handle.cancel();
            }
        }
    }
}

pub(crate) fn report_progress(progress: &ReconcileProgress, quiet: bool) {
    if !quiet {
        eprintln!("Reconciling: {}", progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_conversations() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("convs.json");
        fs::write(
            &path,
            r#"[
                {"id": "c1", "startedAt": "2024-06-15T10:00:00Z", "transcript": "Hello world", "status": "completed"},
                {"id": "c2", "startedAt": "2024-06-15T11:00:00Z", "messages": [{"body": "hi"}, {"body": ""}]}
            ]"#,
        )
        .unwrap();

        let conversations = load_conversations(&path).unwrap();

        assert_eq!(conversations.len(), 2);
        assert_eq!(conversations[0].transcript.as_deref(), Some("Hello world"));
        assert_eq!(conversations[1].non_empty_messages().len(), 1);
    }

    #[test]
    fn test_load_conversations_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();

        let err = load_conversations(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[tokio::test]
    async fn test_open_cache_backends() {
        let temp_dir = TempDir::new().unwrap();
        let mut ctx = AppContext {
            config: Config::default(),
            config_path: temp_dir.path().join("config.toml"),
            currency: "USD".to_string(),
            json: false,
            styled: false,
        };
        let db = ctx.database().unwrap();

        let cache = ctx.open_cache(&db).unwrap();
        cache.put_authoritative("c1", 2);
        assert!(cache.persist());
        assert_eq!(ctx.open_cache(&db).unwrap().get("c1").unwrap().segment_count, 2);

        ctx.config.cache.backend = "json".to_string();
        let cache = ctx.open_cache(&db).unwrap();
        assert_eq!(cache.stats().authoritative, 0);
        cache.put_quick("c2", 1);
        assert!(cache.persist());
        assert!(temp_dir.path().join("segment_cache_default.json").exists());

        ctx.config.cache.backend = "redis".to_string();
        assert!(ctx.open_cache(&db).is_err());
    }

    #[tokio::test]
    async fn test_same_currency_needs_no_rate() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = AppContext {
            config: Config::default(),
            config_path: temp_dir.path().join("config.toml"),
            currency: "USD".to_string(),
            json: false,
            styled: false,
        };
        let db = ctx.database().unwrap();

        let cost = ctx.cost_converter(&db).await.to_cost(100);
        assert!(cost.converted);
        assert_eq!(cost.currency, "USD");
    }
}
