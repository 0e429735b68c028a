use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::models::SegmentPricing;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FxError {
    #[error("no exchange rate from {from} to {to}")]
    MissingRate { from: String, to: String },
    #[error("invalid exchange rate {rate} from {from} to {to}")]
    InvalidRate { from: String, to: String, rate: f64 },
}

/// Synchronous currency lookup used on the cost path
pub trait FxRates: Send + Sync {
    fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64, FxError>;
}

/// In-memory rate table. A pair also answers its inverse.
#[derive(Debug, Clone, Default)]
pub struct FixedRates {
    rates: HashMap<(String, String), f64>,
}

impl FixedRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: &str, to: &str, rate: f64) {
        self.rates
            .insert((from.to_uppercase(), to.to_uppercase()), rate);
    }

    pub fn with_rate(mut self, from: &str, to: &str, rate: f64) -> Self {
        self.insert(from, to, rate);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    fn lookup(&self, from: &str, to: &str) -> Option<f64> {
        if let Some(rate) = self.rates.get(&(from.to_string(), to.to_string())) {
            return Some(*rate);
        }
        self.rates
            .get(&(to.to_string(), from.to_string()))
            .map(|rate| 1.0 / rate)
    }
}

impl FxRates for FixedRates {
    fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64, FxError> {
        let from = from.to_uppercase();
        let to = to.to_uppercase();
        if from == to {
            return Ok(amount);
        }

        let rate = self.lookup(&from, &to).ok_or_else(|| FxError::MissingRate {
            from: from.clone(),
            to: to.clone(),
        })?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(FxError::InvalidRate { from, to, rate });
        }
        Ok(amount * rate)
    }
}

/// Cost of a segment total in the display currency
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub amount: f64,
    pub currency: String,
    /// False when the amount stayed in the base currency because no rate was available
    pub converted: bool,
}

/// Turns segment totals into money
#[derive(Clone)]
pub struct CostConverter {
    pricing: SegmentPricing,
    target_currency: String,
    rates: Arc<dyn FxRates>,
}

impl std::fmt::Debug for CostConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostConverter")
            .field("pricing", &self.pricing)
            .field("target_currency", &self.target_currency)
            .finish()
    }
}

impl CostConverter {
    pub fn new(pricing: SegmentPricing, target_currency: impl Into<String>, rates: Arc<dyn FxRates>) -> Self {
        Self {
            pricing,
            target_currency: target_currency.into().to_uppercase(),
            rates,
        }
    }

    /// Base-currency pricing with no conversion
    pub fn base_only(pricing: SegmentPricing) -> Self {
        let target = pricing.base_currency.clone();
        Self::new(pricing, target, Arc::new(FixedRates::new()))
    }

    pub fn target_currency(&self) -> &str {
        &self.target_currency
    }

    pub fn to_cost(&self, segments: u64) -> CostEstimate {
        let base_amount = self.pricing.calculate_cost(segments);
        let base_currency = self.pricing.base_currency.to_uppercase();

        if base_currency == self.target_currency {
            return CostEstimate {
                amount: base_amount,
                currency: base_currency,
                converted: true,
            };
        }

        match self
            .rates
            .convert(base_amount, &base_currency, &self.target_currency)
        {
            Ok(amount) => CostEstimate {
                amount,
                currency: self.target_currency.clone(),
                converted: true,
            },
            Err(e) => {
                tracing::warn!(error = %e, "currency conversion unavailable; showing base currency");
                CostEstimate {
                    amount: base_amount,
                    currency: base_currency,
                    converted: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_currency_cost() {
        let converter = CostConverter::base_only(SegmentPricing::default());
        let cost = converter.to_cost(1000);

        assert!((cost.amount - 8.3).abs() < 1e-9);
        assert_eq!(cost.currency, "USD");
        assert!(cost.converted);
    }

    #[test]
    fn test_converted_cost() {
        let rates = FixedRates::new().with_rate("USD", "EUR", 0.9);
        let converter = CostConverter::new(SegmentPricing::default(), "eur", Arc::new(rates));
        let cost = converter.to_cost(1000);

        assert!((cost.amount - 7.47).abs() < 1e-9);
        assert_eq!(cost.currency, "EUR");
        assert!(cost.converted);
    }

    #[test]
    fn test_missing_rate_falls_back_to_base_currency() {
        let converter = CostConverter::new(SegmentPricing::default(), "JPY", Arc::new(FixedRates::new()));
        let cost = converter.to_cost(100);

        assert!((cost.amount - 0.83).abs() < 1e-9);
        assert_eq!(cost.currency, "USD");
        assert!(!cost.converted);
    }

    #[test]
    fn test_zero_segments_cost_nothing() {
        let converter = CostConverter::base_only(SegmentPricing::default());
        assert_eq!(converter.to_cost(0).amount, 0.0);
    }

    #[test]
    fn test_fixed_rates_inverse_lookup() {
        let rates = FixedRates::new().with_rate("EUR", "USD", 1.25);

        let usd_to_eur = rates.convert(10.0, "USD", "EUR").unwrap();
        assert!((usd_to_eur - 8.0).abs() < 1e-9);
        assert_eq!(rates.convert(3.0, "usd", "USD").unwrap(), 3.0);
        assert_eq!(
            rates.convert(1.0, "USD", "GBP"),
            Err(FxError::MissingRate {
                from: "USD".to_string(),
                to: "GBP".to_string()
            })
        );
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let rates = FixedRates::new().with_rate("USD", "EUR", 0.0);
        assert!(matches!(
            rates.convert(1.0, "USD", "EUR"),
            Err(FxError::InvalidRate { .. })
        ));
    }
}
