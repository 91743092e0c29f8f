//! Time-windowed call metrics for circuit-breaker overload protection
//!
//! Calls are bucketed into one-second slices per operation key; slow calls
//! feed per-slice duration buckets while fast calls only bump the overall
//! counters. Aggregate queries (averages, extrema, percentile estimates)
//! run over whatever the concurrent writers have published, and stale
//! slices are swept out by bounded background tasks.

pub mod registry;
pub mod relay;
pub mod series;
pub mod sweeper;

pub use registry::{MetricsCollector, MetricsRegistry};
pub use relay::{CircuitStateRelay, RelayError, DEFAULT_RELAY_CAPACITY};
pub use series::{current_slice, OperationSeries};
pub use sweeper::{RetentionSweeper, SweepLimiter, MAX_CONCURRENT_SWEEPS};
