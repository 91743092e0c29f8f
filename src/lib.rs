//! Loadguard Library
//!
//! Time-windowed call metrics for circuit-breaker overload protection:
//! per-operation duration buckets in one-second slices, overall slow/fast
//! call accounting, aggregate latency queries and an asynchronous relay
//! for circuit state transitions.

// Core domain types - the most commonly used types
pub use loadguard_types::{
	// External dependencies for convenience
	chrono,
	// Core types
	CircuitState,
	CircuitStateChange,
	DurationBucket,
};

// Metrics engine
pub use loadguard_metrics::{
	current_slice, CircuitStateRelay, MetricsCollector, MetricsRegistry, OperationSeries,
	RelayError, RetentionSweeper, SweepLimiter, DEFAULT_RELAY_CAPACITY, MAX_CONCURRENT_SWEEPS,
};

// Config
pub use loadguard_config::{
	load_settings, load_settings_from, ConfigValidationError, MetricsSettings,
};

// Module aliases for qualified usage
pub mod types {
	pub use loadguard_types::*;
}

pub mod metrics {
	pub use loadguard_metrics::*;
}

pub mod config {
	pub use loadguard_config::*;
}

use std::sync::Arc;
use tracing::info;

/// Builder pattern for configuring the metrics engine
pub struct LoadguardBuilder {
	settings: Option<MetricsSettings>,
	relay_capacity: usize,
}

impl Default for LoadguardBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl LoadguardBuilder {
	/// Create a new builder with defaults resolved at build time
	pub fn new() -> Self {
		Self {
			settings: None,
			relay_capacity: DEFAULT_RELAY_CAPACITY,
		}
	}

	/// Use explicit settings instead of loading them from configuration
	pub fn with_settings(mut self, settings: MetricsSettings) -> Self {
		self.settings = Some(settings);
		self
	}

	/// Queue depth of the circuit state relay
	pub fn with_relay_capacity(mut self, capacity: usize) -> Self {
		self.relay_capacity = capacity;
		self
	}

	/// Validate the settings and build the registry
	pub fn build(self) -> Result<Arc<MetricsRegistry>, ConfigValidationError> {
		let settings = match self.settings {
			Some(settings) => settings,
			None => load_settings().map_err(|e| ConfigValidationError::Load(e.to_string()))?,
		};
		settings.validate()?;

		info!(
			slow_call_threshold_ms = settings.slow_call_threshold_ms,
			max_bucket_count = settings.max_bucket_count,
			"metrics registry configured"
		);
		Ok(Arc::new(MetricsRegistry::new(settings)))
	}

	/// Build the registry and spawn a circuit state relay feeding it.
	///
	/// Must run inside a tokio runtime; the relay worker is spawned on it.
	pub fn build_with_relay(
		self,
	) -> Result<(Arc<MetricsRegistry>, CircuitStateRelay), ConfigValidationError> {
		let capacity = self.relay_capacity;
		let registry = self.build()?;
		let relay = CircuitStateRelay::spawn(
			Arc::clone(&registry) as Arc<dyn MetricsCollector>,
			capacity,
		);
		Ok((registry, relay))
	}
}
