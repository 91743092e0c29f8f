//! Loadguard Types
//!
//! Shared data model for the loadguard metrics engine: the per-slice
//! duration bucket and the circuit state types reported by the external
//! breaker.

pub mod circuit;
pub mod metrics;

// Re-export chrono for convenience
pub use chrono;

// Re-export commonly used types
pub use circuit::{CircuitState, CircuitStateChange};
pub use metrics::DurationBucket;
