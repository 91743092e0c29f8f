//! Configuration settings structures

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for metrics configuration
#[derive(Debug, Error)]
pub enum ConfigValidationError {
	#[error("max_bucket_count must be at least 3, got {0}")]
	RetentionCeilingTooSmall(usize),
	#[error("percentile_cutoff must be within (0.0, 1.0), got {0}")]
	PercentileCutoffOutOfRange(f64),
	#[error("rounding_decimals must be at most 15, got {0}")]
	RoundingPrecisionTooLarge(u32),
	#[error("configuration could not be loaded: {0}")]
	Load(String),
}

/// Tuning knobs for the metrics registry.
///
/// All values are resolved once at construction time; the engine never
/// re-reads configuration while running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsSettings {
	/// Calls at or above this duration (milliseconds) count as slow and are
	/// recorded into per-operation buckets; faster calls only bump the
	/// overall fast-call counter.
	pub slow_call_threshold_ms: u64,
	/// Maximum buckets kept per operation series before a retention sweep
	/// is triggered. The default corresponds to 12 hours of one-second
	/// slices.
	pub max_bucket_count: usize,
	/// Decimal precision used for the half-up rounded divisions in the
	/// query surface.
	pub rounding_decimals: u32,
	/// Percentile queries above this value are rejected with an empty
	/// result; per-second averaging makes higher percentiles unreliable.
	pub percentile_cutoff: f64,
}

impl Default for MetricsSettings {
	fn default() -> Self {
		Self {
			slow_call_threshold_ms: 100,
			max_bucket_count: 12 * 60 * 60,
			rounding_decimals: 10,
			percentile_cutoff: 0.99,
		}
	}
}

impl MetricsSettings {
	/// Check that the configured values are usable
	pub fn validate(&self) -> Result<(), ConfigValidationError> {
		if self.max_bucket_count < 3 {
			return Err(ConfigValidationError::RetentionCeilingTooSmall(
				self.max_bucket_count,
			));
		}
		if !(self.percentile_cutoff > 0.0 && self.percentile_cutoff < 1.0) {
			return Err(ConfigValidationError::PercentileCutoffOutOfRange(
				self.percentile_cutoff,
			));
		}
		// beyond ~15 significant decimals an f64 cannot represent the scale
		if self.rounding_decimals > 15 {
			return Err(ConfigValidationError::RoundingPrecisionTooLarge(
				self.rounding_decimals,
			));
		}
		Ok(())
	}

	/// Slice id below which a sweep started now would consider buckets
	/// stale: two thirds of the ceiling are kept so that one sweep removes
	/// a meaningful chunk instead of thrashing on every insert.
	pub fn stale_boundary(&self, current_slice: i64) -> i64 {
		current_slice - (self.max_bucket_count * 2 / 3) as i64
	}
}
