//! Metrics data structures shared across the workspace

pub mod bucket;

pub use bucket::DurationBucket;
