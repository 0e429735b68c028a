use serde::{Deserialize, Serialize};

/// Default provider price per outbound segment, in the provider's base currency
pub const DEFAULT_UNIT_PRICE: f64 = 0.0083;
pub const DEFAULT_BASE_CURRENCY: &str = "USD";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentPricing {
    pub unit_price: f64,      // Cost per segment
    pub base_currency: String, // Currency the provider bills in
}

impl SegmentPricing {
    pub fn new(unit_price: f64, base_currency: impl Into<String>) -> Self {
        Self {
            unit_price,
            base_currency: base_currency.into(),
        }
    }

    /// Cost of an aggregate segment count in the base currency
    pub fn calculate_cost(&self, segments: u64) -> f64 {
        segments as f64 * self.unit_price
    }
}

impl Default for SegmentPricing {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT_PRICE, DEFAULT_BASE_CURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pricing() {
        let pricing = SegmentPricing::default();
        assert!((pricing.unit_price - 0.0083).abs() < f64::EPSILON);
        assert_eq!(pricing.base_currency, "USD");
    }

    #[test]
    fn test_segment_cost_calculation() {
        let pricing = SegmentPricing::default();

        let cost = pricing.calculate_cost(1000);
        assert!((cost - 8.3).abs() < 0.0001, "Expected 8.3, got {}", cost);
        assert_eq!(pricing.calculate_cost(0), 0.0);
    }

    #[test]
    fn test_aggregate_pricing_avoids_per_item_rounding() {
        let pricing = SegmentPricing::new(0.0083, "USD");

        // Rounding each conversation to cents first would drift from the aggregate
        let per_item_rounded: f64 = (0..100)
            .map(|_| (pricing.calculate_cost(1) * 100.0).round() / 100.0)
            .sum();
        let aggregate = pricing.calculate_cost(100);

        assert!((aggregate - 0.83).abs() < 0.0001);
        assert!((per_item_rounded - 1.0).abs() < 0.0001);
    }
}
