// Utility functions module
pub mod window;

pub use window::{TimeWindow, TimezoneCalculator, WindowSpec};
