use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::pricing::{DEFAULT_BASE_CURRENCY, DEFAULT_UNIT_PRICE};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub currency: CurrencyConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub timezone: TimezoneConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrencyConfig {
    pub default_currency: String,
    pub cache_ttl_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingConfig {
    pub unit_price: f64,
    pub base_currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    pub ttl_hours: u32,
    pub backend: String, // "sqlite" or "json"
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconcileConfig {
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub per_day_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub base_url: String,
    pub api_token_env: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    pub colored: bool,
    pub decimal_places: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimezoneConfig {
    pub timezone: String,      // e.g., "UTC", "America/New_York"
    pub daily_cutoff_hour: u8, // 0-23, hour when new day starts
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            cache_ttl_hours: 24,
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            unit_price: DEFAULT_UNIT_PRICE,
            base_currency: DEFAULT_BASE_CURRENCY.to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 12,
            backend: "sqlite".to_string(),
            scope: "default".to_string(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay_ms: 100,
            max_attempts: 3,
            base_backoff_ms: 1000,
            max_backoff_ms: 8000,
            per_day_limit: 150,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_token_env: "SMSCOST_API_TOKEN".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            colored: false,
            decimal_places: 4,
        }
    }
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            daily_cutoff_hour: 0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            currency: CurrencyConfig::default(),
            pricing: PricingConfig::default(),
            cache: CacheConfig::default(),
            reconcile: ReconcileConfig::default(),
            service: ServiceConfig::default(),
            output: OutputConfig::default(),
            timezone: TimezoneConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, writing defaults there first if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let contents = self.to_commented_toml()?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Generate TOML configuration with comments explaining every option
    pub fn to_commented_toml(&self) -> Result<String> {
        let mut output = String::new();

        output.push_str("# smscost Configuration File\n");
        output.push_str("# SMS segment and cost accounting\n");
        output.push_str("#\n");
        output.push_str("# All settings have sensible defaults and some can be overridden via CLI flags.\n");
        output.push('\n');

        section(&mut output, "CURRENCY SETTINGS");
        output.push_str("[currency]\n");
        output.push_str("# Currency costs are displayed in\n");
        output.push_str("# Exchange rates are fetched from the European Central Bank (ECB)\n");
        output.push_str(&format!("default_currency = \"{}\"\n", self.currency.default_currency));
        output.push('\n');
        output.push_str("# How long to keep fetched exchange rates (in hours)\n");
        output.push_str(&format!("cache_ttl_hours = {}\n", self.currency.cache_ttl_hours));
        output.push('\n');

        section(&mut output, "PRICING SETTINGS");
        output.push_str("[pricing]\n");
        output.push_str("# Provider price per outbound segment, in base_currency\n");
        output.push_str(&format!("unit_price = {}\n", toml_float(self.pricing.unit_price)));
        output.push('\n');
        output.push_str("# Currency the provider bills in\n");
        output.push_str(&format!("base_currency = \"{}\"\n", self.pricing.base_currency));
        output.push('\n');

        section(&mut output, "SEGMENT CACHE SETTINGS");
        output.push_str("[cache]\n");
        output.push_str("# Age after which cached segment counts are discarded (in hours)\n");
        output.push_str(&format!("ttl_hours = {}\n", self.cache.ttl_hours));
        output.push('\n');
        output.push_str("# Where the cache is persisted:\n");
        output.push_str("#   \"sqlite\" - cache.db next to this file (default)\n");
        output.push_str("#   \"json\"   - segment_cache_{scope}.json next to this file\n");
        output.push_str(&format!("backend = \"{}\"\n", self.cache.backend));
        output.push('\n');
        output.push_str("# Record key; use one scope per account to keep caches apart\n");
        output.push_str(&format!("scope = \"{}\"\n", self.cache.scope));
        output.push('\n');

        section(&mut output, "RECONCILIATION SETTINGS");
        output.push_str("[reconcile]\n");
        output.push_str("# Conversations fetched concurrently per batch\n");
        output.push_str(&format!("batch_size = {}\n", self.reconcile.batch_size));
        output.push('\n');
        output.push_str("# Pause between batches (in milliseconds)\n");
        output.push_str(&format!("batch_delay_ms = {}\n", self.reconcile.batch_delay_ms));
        output.push('\n');
        output.push_str("# Fetch attempts for a rate-limited batch before it is reported degraded\n");
        output.push_str("# Backoff doubles from base_backoff_ms up to max_backoff_ms\n");
        output.push_str(&format!("max_attempts = {}\n", self.reconcile.max_attempts));
        output.push_str(&format!("base_backoff_ms = {}\n", self.reconcile.base_backoff_ms));
        output.push_str(&format!("max_backoff_ms = {}\n", self.reconcile.max_backoff_ms));
        output.push('\n');
        output.push_str("# Most conversations needing reconciliation that are plausible per day of view\n");
        output.push_str("# A pass over more than this is aborted as a likely filtering mistake\n");
        output.push_str(&format!("per_day_limit = {}\n", self.reconcile.per_day_limit));
        output.push('\n');

        section(&mut output, "CONVERSATION SERVICE SETTINGS");
        output.push_str("[service]\n");
        output.push_str("# Base URL; conversations are fetched from {base_url}/conversations/{id}\n");
        output.push_str(&format!("base_url = \"{}\"\n", self.service.base_url));
        output.push('\n');
        output.push_str("# Environment variable holding the bearer token\n");
        output.push_str(&format!("api_token_env = \"{}\"\n", self.service.api_token_env));
        output.push('\n');
        output.push_str("# Request timeout (in seconds)\n");
        output.push_str(&format!("timeout_secs = {}\n", self.service.timeout_secs));
        output.push('\n');

        section(&mut output, "OUTPUT SETTINGS");
        output.push_str("[output]\n");
        output.push_str("# Enable colored table output by default\n");
        output.push_str(&format!("colored = {}\n", self.output.colored));
        output.push('\n');
        output.push_str("# Number of decimal places for currency display\n");
        output.push_str(&format!("decimal_places = {}\n", self.output.decimal_places));
        output.push('\n');

        section(&mut output, "TIMEZONE SETTINGS");
        output.push_str("[timezone]\n");
        output.push_str("# Timezone for date windows such as --today and --yesterday\n");
        output.push_str("# Examples: \"UTC\", \"America/New_York\", \"Europe/London\"\n");
        output.push_str(&format!("timezone = \"{}\"\n", self.timezone.timezone));
        output.push('\n');
        output.push_str("# Hour of day when a new \"day\" begins (0-23)\n");
        output.push_str(&format!("daily_cutoff_hour = {}\n", self.timezone.daily_cutoff_hour));
        output.push('\n');

        section(&mut output, "USAGE NOTES");
        output.push_str("#\n");
        output.push_str("# Command-line flags override these configuration values:\n");
        output.push_str("#   --currency EUR        Override default_currency\n");
        output.push_str("#   --timezone UTC        Override timezone\n");
        output.push_str("#   --config /path/file   Use a different config file\n");
        output.push_str("#\n");
        output.push_str("# To reset to defaults: smscost config init\n");
        output.push_str("# To modify values:     smscost config set currency.default_currency EUR\n");
        output.push_str("# To view current:      smscost config show\n");

        Ok(output)
    }

    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to determine home directory")?;
        Ok(home.join(".config").join("smscost").join("config.toml"))
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "currency.default_currency" => self.currency.default_currency = value.to_uppercase(),
            "currency.cache_ttl_hours" => {
                self.currency.cache_ttl_hours = value
                    .parse()
                    .with_context(|| format!("Invalid TTL value: {}", value))?;
            }
            "pricing.unit_price" => {
                let price: f64 = value
                    .parse()
                    .with_context(|| format!("Invalid unit price: {}", value))?;
                if !price.is_finite() || price < 0.0 {
                    anyhow::bail!("Unit price must be a non-negative number");
                }
                self.pricing.unit_price = price;
            }
            "pricing.base_currency" => self.pricing.base_currency = value.to_uppercase(),
            "cache.ttl_hours" => {
                self.cache.ttl_hours = value
                    .parse()
                    .with_context(|| format!("Invalid TTL value: {}", value))?;
            }
            "cache.backend" => {
                if !["sqlite", "json"].contains(&value) {
                    anyhow::bail!("Invalid cache backend: {}. Must be 'sqlite' or 'json'", value);
                }
                self.cache.backend = value.to_string();
            }
            "cache.scope" => {
                if value.trim().is_empty() {
                    anyhow::bail!("Cache scope must not be empty");
                }
                self.cache.scope = value.to_string();
            }
            "reconcile.batch_size" => {
                let size: usize = value
                    .parse()
                    .with_context(|| format!("Invalid batch size: {}", value))?;
                if size == 0 {
                    anyhow::bail!("Batch size must be at least 1");
                }
                self.reconcile.batch_size = size;
            }
            "reconcile.batch_delay_ms" => {
                self.reconcile.batch_delay_ms = value
                    .parse()
                    .with_context(|| format!("Invalid delay value: {}", value))?;
            }
            "reconcile.max_attempts" => {
                self.reconcile.max_attempts = value
                    .parse()
                    .with_context(|| format!("Invalid attempt count: {}", value))?;
            }
            "reconcile.base_backoff_ms" => {
                self.reconcile.base_backoff_ms = value
                    .parse()
                    .with_context(|| format!("Invalid backoff value: {}", value))?;
            }
            "reconcile.max_backoff_ms" => {
                self.reconcile.max_backoff_ms = value
                    .parse()
                    .with_context(|| format!("Invalid backoff value: {}", value))?;
            }
            "reconcile.per_day_limit" => {
                self.reconcile.per_day_limit = value
                    .parse()
                    .with_context(|| format!("Invalid limit value: {}", value))?;
            }
            "service.base_url" => self.service.base_url = value.to_string(),
            "service.api_token_env" => self.service.api_token_env = value.to_string(),
            "service.timeout_secs" => {
                self.service.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout value: {}", value))?;
            }
            "output.colored" => {
                self.output.colored = value
                    .parse()
                    .with_context(|| format!("Invalid boolean value: {}", value))?;
            }
            "output.decimal_places" => {
                let places: u8 = value
                    .parse()
                    .with_context(|| format!("Invalid decimal places value: {}", value))?;
                if places > 10 {
                    anyhow::bail!("Decimal places must be between 0 and 10");
                }
                self.output.decimal_places = places;
            }
            "timezone.timezone" => {
                value
                    .parse::<chrono_tz::Tz>()
                    .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {}", value, e))?;
                self.timezone.timezone = value.to_string();
            }
            "timezone.daily_cutoff_hour" => {
                let hour: u8 = value
                    .parse()
                    .with_context(|| format!("Invalid hour value: {}", value))?;
                if hour > 23 {
                    anyhow::bail!("Hour must be between 0 and 23");
                }
                self.timezone.daily_cutoff_hour = hour;
            }
            _ => anyhow::bail!("Unknown configuration key: {}", key),
        }
        Ok(())
    }
}

fn section(output: &mut String, title: &str) {
    output.push_str("# =============================================================================\n");
    output.push_str(&format!("# {}\n", title));
    output.push_str("# =============================================================================\n");
    output.push('\n');
}

// TOML needs a decimal point to read the value back as a float
fn toml_float(value: f64) -> String {
    let formatted = value.to_string();
    if formatted.contains('.') || formatted.contains('e') {
        formatted
    } else {
        format!("{}.0", formatted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_commented_toml_round_trips() {
        let mut config = Config::default();
        config.pricing.unit_price = 1.0;
        config.service.base_url = "https://api.example.test".to_string();

        let text = config.to_commented_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();

        assert_eq!(parsed, config);
        assert!(text.contains("[reconcile]"));
        assert!(text.contains("unit_price = 1.0"));
    }

    #[test]
    fn test_load_creates_default_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config, Config::default());
        assert!(path.exists());
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: Config = toml::from_str("[pricing]\nunit_price = 0.01\nbase_currency = \"EUR\"\n").unwrap();

        assert_eq!(config.pricing.base_currency, "EUR");
        assert_eq!(config.cache.ttl_hours, 12);
        assert_eq!(config.reconcile.batch_size, 10);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[cache\nttl_hours = ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_set_value() {
        let mut config = Config::default();

        config.set_value("currency.default_currency", "eur").unwrap();
        config.set_value("reconcile.batch_size", "25").unwrap();
        config.set_value("cache.backend", "json").unwrap();
        config.set_value("timezone.timezone", "Europe/Berlin").unwrap();

        assert_eq!(config.currency.default_currency, "EUR");
        assert_eq!(config.reconcile.batch_size, 25);
        assert_eq!(config.cache.backend, "json");
        assert_eq!(config.timezone.timezone, "Europe/Berlin");
    }

    #[test]
    fn test_set_value_rejects_invalid_input() {
        let mut config = Config::default();

        assert!(config.set_value("reconcile.batch_size", "0").is_err());
        assert!(config.set_value("cache.backend", "redis").is_err());
        assert!(config.set_value("timezone.timezone", "Mars/Olympus").is_err());
        assert!(config.set_value("timezone.daily_cutoff_hour", "24").is_err());
        assert!(config.set_value("pricing.unit_price", "-1").is_err());
        assert!(config.set_value("general.cost_mode", "auto").is_err());
        assert_eq!(config, Config::default());
    }
}
