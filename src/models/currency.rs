use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::cost::FixedRates;
use crate::storage::sqlite::Database;

const ECB_DAILY_URL: &str = "https://www.ecb.europa.eu/stats/eurofxref/eurofxref-daily.xml";

/// Exchange rate data from ECB API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub base_currency: String,
    pub target_currency: String,
    pub rate: f64,
    pub fetched_at: DateTime<Utc>,
}

/// Currency conversion manager with ECB API and SQLite caching
///
/// Lookups are async; the cost path itself is synchronous, so callers
/// resolve the rate they need up front with [`CurrencyConverter::resolve_rates`].
pub struct CurrencyConverter {
    db: Arc<Database>,
    cache_ttl_hours: u32,
    client: reqwest::Client,
}

impl CurrencyConverter {
    /// Create a new currency converter
    pub fn new(db: Arc<Database>, cache_ttl_hours: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("smscost/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            db,
            cache_ttl_hours,
            client,
        })
    }

    /// Look up the rate for one currency pair and hand it back as a
    /// synchronous rate table for the cost converter.
    pub async fn resolve_rates(&self, from_currency: &str, to_currency: &str) -> Result<FixedRates> {
        // ECB codes are upper case; config files may not be
        let from_currency = from_currency.trim().to_uppercase();
        let to_currency = to_currency.trim().to_uppercase();

        let mut rates = FixedRates::new();
        if from_currency != to_currency {
            let rate = self.get_exchange_rate(&from_currency, &to_currency).await?;
            rates.insert(&from_currency, &to_currency, rate);
        }
        Ok(rates)
    }

    /// Get exchange rate between two currencies
    async fn get_exchange_rate(&self, from_currency: &str, to_currency: &str) -> Result<f64> {
        if let Ok(cached_rate) = self.get_cached_rate(from_currency, to_currency) {
            return Ok(cached_rate);
        }

        let rate = self.fetch_ecb_rate(from_currency, to_currency).await?;

        let exchange_rate = ExchangeRate {
            base_currency: from_currency.to_string(),
            target_currency: to_currency.to_string(),
            rate,
            fetched_at: Utc::now(),
        };

        if let Err(e) = self.cache_exchange_rate(&exchange_rate) {
            tracing::warn!(error = %e, "failed to cache exchange rate");
        }

        Ok(rate)
    }

    /// Get cached exchange rate if still valid
    fn get_cached_rate(&self, from_currency: &str, to_currency: &str) -> Result<f64> {
        if let Some((rate, fetched_at_str)) = self.db.get_exchange_rate(from_currency, to_currency)? {
            let fetched_at = DateTime::parse_from_rfc3339(&fetched_at_str)
                .context("Invalid datetime in cache")?
                .with_timezone(&Utc);

            let age_hours = Utc::now().signed_duration_since(fetched_at).num_hours();

            if age_hours < i64::from(self.cache_ttl_hours) {
                return Ok(rate);
            }
        }

        anyhow::bail!("No valid cached rate found")
    }

    /// Cache exchange rate in database
    pub fn cache_exchange_rate(&self, rate: &ExchangeRate) -> Result<()> {
        self.db.save_exchange_rate(
            &rate.base_currency,
            &rate.target_currency,
            rate.rate,
            &rate.fetched_at.to_rfc3339(),
        )
    }

    /// Fetch exchange rate from ECB API
    async fn fetch_ecb_rate(&self, from_currency: &str, to_currency: &str) -> Result<f64> {
        let response = self
            .client
            .get(ECB_DAILY_URL)
            .send()
            .await
            .context("Failed to fetch ECB exchange rates")?;

        if !response.status().is_success() {
            anyhow::bail!("ECB API returned error: {}", response.status());
        }

        let xml_text = response.text().await?;

        // ECB quotes everything against EUR
        let eur_to_target = parse_ecb_rate(&xml_text, to_currency)?;
        let eur_to_base = parse_ecb_rate(&xml_text, from_currency)?;

        Ok(eur_to_target / eur_to_base)
    }

    /// Clear expired cache entries
    pub fn cleanup_cache(&self) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::hours(i64::from(self.cache_ttl_hours));
        self.db.cleanup_exchange_rates(&cutoff.to_rfc3339())
    }
}

/// Extract the EUR-based rate for `currency` from the ECB daily XML
pub fn parse_ecb_rate(xml_text: &str, currency: &str) -> Result<f64> {
    if currency == "EUR" {
        return Ok(1.0);
    }

    // ECB uses single quotes: currency='USD' rate='1.1429'
    let pattern = format!(r#"currency='{}' rate='([0-9.]+)'"#, regex::escape(currency));
    let re = regex::Regex::new(&pattern).context("Failed to create regex")?;

    let rate_str = re
        .captures(xml_text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
        .with_context(|| format!("Currency {} not found in ECB data", currency))?;

    rate_str.parse().context("Failed to parse exchange rate")
}

/// Format currency amount with appropriate symbol and decimals
pub fn format_currency(amount: f64, currency: &str, decimal_places: u8) -> String {
    let symbol = match currency {
        "USD" | "CAD" | "AUD" => "$",
        "EUR" => "€",
        "GBP" => "£",
        "JPY" | "CNY" => "¥",
        _ => currency,
    };

    let formatted_amount = format!("{:.width$}", amount, width = decimal_places as usize);

    match currency {
        "USD" | "GBP" => format!("{}{}", symbol, formatted_amount),
        "CAD" | "AUD" => format!("{}{} {}", symbol, formatted_amount, currency),
        "EUR" | "JPY" | "CNY" => format!("{} {}", formatted_amount, symbol),
        _ => format!("{} {}", formatted_amount, currency),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cost::FxRates;
    use tempfile::TempDir;

    fn create_test_converter() -> (CurrencyConverter, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Arc::new(Database::new(&db_path).unwrap());
        let converter = CurrencyConverter::new(db, 24).unwrap();
        (converter, temp_dir)
    }

    #[tokio::test]
    async fn test_cache_storage_and_retrieval() {
        let (converter, _temp_dir) = create_test_converter();

        let rate = ExchangeRate {
            base_currency: "USD".to_string(),
            target_currency: "EUR".to_string(),
            rate: 0.85,
            fetched_at: Utc::now(),
        };

        converter.cache_exchange_rate(&rate).unwrap();

        let cached_rate = converter.get_cached_rate("USD", "EUR").unwrap();
        assert!((cached_rate - 0.85).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_expired_cache_rejection() {
        let (converter, _temp_dir) = create_test_converter();

        let old_rate = ExchangeRate {
            base_currency: "USD".to_string(),
            target_currency: "EUR".to_string(),
            rate: 0.85,
            fetched_at: Utc::now() - chrono::Duration::hours(25), // Older than 24h TTL
        };

        converter.cache_exchange_rate(&old_rate).unwrap();

        assert!(converter.get_cached_rate("USD", "EUR").is_err());
    }

    #[tokio::test]
    async fn test_cache_cleanup() {
        let (converter, _temp_dir) = create_test_converter();

        converter
            .cache_exchange_rate(&ExchangeRate {
                base_currency: "USD".to_string(),
                target_currency: "EUR".to_string(),
                rate: 0.85,
                fetched_at: Utc::now() - chrono::Duration::hours(25),
            })
            .unwrap();
        converter
            .cache_exchange_rate(&ExchangeRate {
                base_currency: "USD".to_string(),
                target_currency: "GBP".to_string(),
                rate: 0.80,
                fetched_at: Utc::now(),
            })
            .unwrap();

        let cleaned = converter.cleanup_cache().unwrap();
        assert_eq!(cleaned, 1); // Only the stale USD->EUR rate goes
    }

    #[tokio::test]
    async fn test_resolve_rates_uses_cached_rate() {
        let (converter, _temp_dir) = create_test_converter();

        converter
            .cache_exchange_rate(&ExchangeRate {
                base_currency: "USD".to_string(),
                target_currency: "EUR".to_string(),
                rate: 0.875,
                fetched_at: Utc::now(),
            })
            .unwrap();

        let rates = converter.resolve_rates("USD", "EUR").await.unwrap();
        let converted = rates.convert(100.0, "USD", "EUR").unwrap();
        assert!((converted - 87.5).abs() < 0.1);
    }

    #[tokio::test]
    async fn test_resolve_rates_ignores_currency_case() {
        let (converter, _temp_dir) = create_test_converter();

        converter
            .cache_exchange_rate(&ExchangeRate {
                base_currency: "USD".to_string(),
                target_currency: "EUR".to_string(),
                rate: 0.875,
                fetched_at: Utc::now(),
            })
            .unwrap();

        // Served from the USD->EUR cache entry, so no network lookup happens
        let rates = converter.resolve_rates("usd", " Eur ").await.unwrap();
        let converted = rates.convert(100.0, "USD", "EUR").unwrap();
        assert!((converted - 87.5).abs() < 0.1);

        assert!(converter.resolve_rates("usd", "USD").await.unwrap().is_empty());
    }

    #[test]
    fn test_parse_ecb_rate_single_quotes() {
        let xml_data = r#"
            <Cube currency='USD' rate='1.1429'/>
            <Cube currency='GBP' rate='0.8567'/>
            <Cube currency='JPY' rate='144.52'/>
        "#;

        let rate = parse_ecb_rate(xml_data, "USD").unwrap();
        assert!((rate - 1.1429).abs() < 0.0001);
        assert_eq!(parse_ecb_rate(xml_data, "EUR").unwrap(), 1.0);
        assert!(parse_ecb_rate(xml_data, "CHF").is_err());
    }

    #[test]
    fn test_parse_ecb_rate_rejects_double_quotes() {
        let xml_data = r#"<Cube currency="USD" rate="1.1429"/>"#;
        assert!(parse_ecb_rate(xml_data, "USD").is_err());
    }

    #[test]
    fn test_currency_formatting() {
        assert_eq!(format_currency(1234.56, "USD", 2), "$1234.56");
        assert_eq!(format_currency(1000.0, "USD", 0), "$1000");
        assert_eq!(format_currency(1234.56, "EUR", 2), "1234.56 €");
        assert_eq!(format_currency(1234.56, "GBP", 2), "£1234.56");
        assert_eq!(format_currency(1234.0, "JPY", 0), "1234 ¥");
        assert_eq!(format_currency(1234.56, "XYZ", 2), "1234.56 XYZ");
        assert_eq!(format_currency(0.0083, "USD", 4), "$0.0083");
    }
}
