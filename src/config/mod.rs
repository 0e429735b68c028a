pub mod settings;

pub use settings::{
    CacheConfig, Config, CurrencyConfig, OutputConfig, PricingConfig, ReconcileConfig, ServiceConfig,
    TimezoneConfig,
};
