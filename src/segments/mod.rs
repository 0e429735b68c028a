// Segment estimation
pub mod encoding;
pub mod estimator;

pub use encoding::{CarrierSegmentCalculator, SegmentCalculator, SegmentError};
pub use estimator::{ContentSource, SegmentEstimator};
