//! Metrics registry and query surface
//!
//! The registry owns one [`OperationSeries`] per operation key plus the
//! process-wide slow/fast call counters, and answers all aggregate
//! queries. Writes come in through the [`MetricsCollector`] boundary and
//! must never fail or slow the protected call path; queries are pure reads
//! over whatever snapshot the concurrent writers have produced so far.

use crate::series::{current_slice, OperationSeries};
use crate::sweeper::SweepLimiter;
use dashmap::DashMap;
use loadguard_config::MetricsSettings;
use loadguard_types::CircuitState;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Write-side contract between the call-interception layer, the external
/// circuit breaker and the metrics engine.
///
/// Both operations are infallible by design: a metrics bug must never
/// break or delay the protected call.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsCollector: Send + Sync {
	/// Report one completed protected invocation
	fn record(&self, key: &str, duration_ms: u64);

	/// Report a circuit state transition observed by the breaker
	fn on_circuit_state_changed(&self, key: &str, state: CircuitState);
}

/// Process-wide metrics store: per-operation bucket series plus overall
/// slow/fast call counters.
///
/// Constructed once and shared by reference; there is no global instance.
#[derive(Debug)]
pub struct MetricsRegistry {
	settings: MetricsSettings,
	series: DashMap<String, Arc<OperationSeries>>,
	// signed so wraparound shows up as a negative value after increment
	overall_slow_calls: AtomicI64,
	overall_fast_calls: AtomicI64,
	sweep_limiter: Arc<SweepLimiter>,
}

impl MetricsRegistry {
	pub fn new(settings: MetricsSettings) -> Self {
		Self {
			settings,
			series: DashMap::new(),
			overall_slow_calls: AtomicI64::new(0),
			overall_fast_calls: AtomicI64::new(0),
			sweep_limiter: Arc::new(SweepLimiter::new()),
		}
	}

	/// The settings this registry was built with
	pub fn settings(&self) -> &MetricsSettings {
		&self.settings
	}

	/// The series for a key, created lazily on first use
	fn series_for(&self, key: &str) -> Arc<OperationSeries> {
		if let Some(existing) = self.series.get(key) {
			return Arc::clone(existing.value());
		}
		let entry = self.series.entry(key.to_string()).or_insert_with(|| {
			debug!(key, "creating operation series");
			Arc::new(OperationSeries::new(
				self.settings.clone(),
				Arc::clone(&self.sweep_limiter),
			))
		});
		Arc::clone(entry.value())
	}

	fn record_inner(&self, key: &str, duration_ms: u64) {
		if duration_ms >= self.settings.slow_call_threshold_ms {
			self.series_for(key).current_bucket().record_call(duration_ms);
			let count = self
				.overall_slow_calls
				.fetch_add(1, Ordering::Relaxed)
				.wrapping_add(1);
			if count < 0 {
				self.reset_overall_counters();
			}
		} else {
			// fast calls never touch per-operation buckets
			let count = self
				.overall_fast_calls
				.fetch_add(1, Ordering::Relaxed)
				.wrapping_add(1);
			if count < 0 {
				self.reset_overall_counters();
			}
		}
	}

	/// Both counters are reset together so the slow-call ratio stays
	/// meaningful after a wraparound. The reset is silently lossy.
	fn reset_overall_counters(&self) {
		self.overall_slow_calls.store(0, Ordering::Relaxed);
		self.overall_fast_calls.store(0, Ordering::Relaxed);
	}

	/// Percentage of slow calls over everything recorded so far, 0 when no
	/// slow call has been seen yet ("no data" and "0%" are intentionally
	/// indistinguishable).
	pub fn percentage_of_slow_calls(&self) -> f64 {
		let slow = self.overall_slow_calls.load(Ordering::Relaxed);
		if slow <= 0 {
			return 0.0;
		}
		let fast = self.overall_fast_calls.load(Ordering::Relaxed).max(0);

		let per_call = round_half_up(100.0 / (slow + fast) as f64, self.settings.rounding_decimals);
		(per_call * slow as f64).trunc()
	}

	/// Per-key mean of the bucket averages up to `as_of` (default: the
	/// current slice, inclusive).
	///
	/// Each populated bucket contributes its own average exactly once -
	/// equal weight per time slice, not per call. Keys without a populated
	/// bucket in range are omitted.
	pub fn overall_average(&self, as_of: Option<i64>) -> HashMap<String, u64> {
		let boundary = as_of.unwrap_or_else(current_slice);
		let mut result = HashMap::new();

		for entry in self.series.iter() {
			let mut sum = 0.0;
			let mut populated = 0u64;
			for bucket in entry.value().buckets_up_to(boundary) {
				// a bucket may exist before its first write lands; skip it
				if !bucket.is_populated() {
					continue;
				}
				sum += bucket.average_duration();
				populated += 1;
			}
			if populated > 0 {
				let average =
					round_half_up(sum / populated as f64, self.settings.rounding_decimals);
				result.insert(entry.key().clone(), average.trunc() as u64);
			}
		}
		result
	}

	/// Per-key minimum duration across all populated buckets up to `as_of`
	pub fn overall_min(&self, as_of: Option<i64>) -> HashMap<String, u64> {
		let boundary = as_of.unwrap_or_else(current_slice);
		let mut result = HashMap::new();

		for entry in self.series.iter() {
			let mut min: Option<u64> = None;
			for bucket in entry.value().buckets_up_to(boundary) {
				if !bucket.is_populated() {
					continue;
				}
				let candidate = bucket.min_duration();
				min = Some(min.map_or(candidate, |m| m.min(candidate)));
			}
			if let Some(min) = min {
				result.insert(entry.key().clone(), min);
			}
		}
		result
	}

	/// Per-key maximum duration across all populated buckets up to `as_of`
	pub fn overall_max(&self, as_of: Option<i64>) -> HashMap<String, u64> {
		let boundary = as_of.unwrap_or_else(current_slice);
		let mut result = HashMap::new();

		for entry in self.series.iter() {
			let mut max: Option<u64> = None;
			for bucket in entry.value().buckets_up_to(boundary) {
				if !bucket.is_populated() {
					continue;
				}
				let candidate = bucket.max_duration();
				max = Some(max.map_or(candidate, |m| m.max(candidate)));
			}
			if let Some(max) = max {
				result.insert(entry.key().clone(), max);
			}
		}
		result
	}

	/// Low-percentile latency estimate per key: the mean of the lowest
	/// `p`-fraction of per-slice averages, not a true quantile over
	/// individual calls.
	///
	/// Percentiles above the configured cutoff are rejected outright with
	/// an empty result; per-second averaging makes them unreliable.
	pub fn percentile(&self, p: f64, as_of: Option<i64>) -> HashMap<String, u64> {
		if p > self.settings.percentile_cutoff {
			return HashMap::new();
		}
		let boundary = as_of.unwrap_or_else(current_slice);
		let mut result = HashMap::new();

		for entry in self.series.iter() {
			let mut averages: Vec<u64> = entry
				.value()
				.buckets_up_to(boundary)
				.iter()
				.filter(|bucket| bucket.is_populated())
				.map(|bucket| bucket.average_duration().trunc() as u64)
				.collect();

			if averages.is_empty() {
				continue;
			}
			averages.sort_unstable();

			let index = (averages.len() as f64 * p).trunc() as usize;
			let kept = if index > 0 {
				&averages[..index]
			} else {
				// too few slices for this fraction; fall back to all of them
				&averages[..]
			};

			let sum: u64 = kept.iter().sum();
			let value = if kept.is_empty() {
				sum
			} else {
				round_half_up(sum as f64 / kept.len() as f64, self.settings.rounding_decimals)
					.trunc() as u64
			};
			result.insert(entry.key().clone(), value);
		}
		result
	}

	/// Circuit state recorded in the latest bucket of a key, if the key has
	/// ever been seen
	pub fn circuit_state_of(&self, key: &str) -> Option<CircuitState> {
		self.series
			.get(key)
			.and_then(|entry| entry.value().latest_bucket())
			.map(|bucket| bucket.state())
	}

	/// Number of buckets currently held for a key
	pub fn bucket_count(&self, key: &str) -> usize {
		self.series
			.get(key)
			.map(|entry| entry.value().len())
			.unwrap_or(0)
	}

	/// Overall (slow, fast) call counts; negative intermediate values from
	/// a racing reset read as zero
	pub fn overall_call_counts(&self) -> (u64, u64) {
		let slow = self.overall_slow_calls.load(Ordering::Relaxed).max(0) as u64;
		let fast = self.overall_fast_calls.load(Ordering::Relaxed).max(0) as u64;
		(slow, fast)
	}
}

impl MetricsCollector for MetricsRegistry {
	fn record(&self, key: &str, duration_ms: u64) {
		// metrics failures must never reach the protected call
		if catch_unwind(AssertUnwindSafe(|| self.record_inner(key, duration_ms))).is_err() {
			debug!(key, "swallowed panic while recording call metrics");
		}
	}

	fn on_circuit_state_changed(&self, key: &str, state: CircuitState) {
		let result = catch_unwind(AssertUnwindSafe(|| {
			self.series_for(key).current_bucket().set_state(state);
		}));
		if result.is_err() {
			debug!(key, "swallowed panic while recording circuit state");
		}
	}
}

/// Half-up rounding at a decimal scale, mirroring decimal division with a
/// fixed scale followed by truncation to integer on the query surface
fn round_half_up(value: f64, decimals: u32) -> f64 {
	let scale = 10f64.powi(decimals as i32);
	(value * scale).round() / scale
}

#[cfg(test)]
mod tests {
	use super::*;

	fn registry() -> MetricsRegistry {
		MetricsRegistry::new(MetricsSettings::default())
	}

	fn registry_with(settings: MetricsSettings) -> MetricsRegistry {
		MetricsRegistry::new(settings)
	}

	#[test]
	fn test_empty_registry_is_safe_to_query() {
		let registry = registry();

		assert!(registry.overall_average(None).is_empty());
		assert!(registry.overall_min(None).is_empty());
		assert!(registry.overall_max(None).is_empty());
		assert!(registry.percentile(0.5, None).is_empty());
		assert_eq!(registry.percentage_of_slow_calls(), 0.0);
		assert!(registry.circuit_state_of("svcA").is_none());
	}

	#[test]
	fn test_slow_and_fast_calls_route_differently() {
		let settings = MetricsSettings {
			slow_call_threshold_ms: 15,
			..Default::default()
		};
		let registry = registry_with(settings);

		registry.record("svcA", 10); // fast: counter only
		registry.record("svcA", 20); // slow: bucket + counter
		registry.record("svcA", 30);

		assert_eq!(registry.overall_call_counts(), (2, 1));
		assert_eq!(
			registry.bucket_count("svcA") >= 1,
			true,
			"slow calls must create buckets"
		);

		// only the slow calls populate the series, so the average ignores
		// the 10ms call
		let averages = registry.overall_average(None);
		assert_eq!(averages.get("svcA"), Some(&25));
	}

	#[test]
	fn test_threshold_boundary_counts_as_slow() {
		let settings = MetricsSettings {
			slow_call_threshold_ms: 20,
			..Default::default()
		};
		let registry = registry_with(settings);

		registry.record("svcA", 20);
		assert_eq!(registry.overall_call_counts(), (1, 0));
	}

	#[test]
	fn test_percentage_of_slow_calls() {
		let settings = MetricsSettings {
			slow_call_threshold_ms: 15,
			..Default::default()
		};
		let registry = registry_with(settings);

		registry.record("svcA", 50);
		for _ in 0..3 {
			registry.record("svcA", 1);
		}

		// 1 slow of 4 total
		assert_eq!(registry.percentage_of_slow_calls(), 25.0);
	}

	#[test]
	fn test_counter_overflow_resets_both() {
		let registry = registry();
		registry.overall_slow_calls.store(i64::MAX, Ordering::Relaxed);
		registry.overall_fast_calls.store(123, Ordering::Relaxed);

		// wraps to negative, which must reset both counters
		registry.record("svcA", 500);

		assert_eq!(registry.overall_call_counts(), (0, 0));
		assert_eq!(registry.percentage_of_slow_calls(), 0.0);
	}

	#[test]
	fn test_average_weighs_slices_equally() {
		let registry = registry();
		let series = registry.series_for("svcA");

		// slice 1000: two calls averaging 20; slice 1001: one call of 40
		let first = series.bucket_at(1000);
		first.record_call(10);
		first.record_call(30);
		series.bucket_at(1001).record_call(40);

		// average of averages: (20 + 40) / 2, not (10+30+40)/3
		let averages = registry.overall_average(Some(1001));
		assert_eq!(averages.get("svcA"), Some(&30));
	}

	#[test]
	fn test_as_of_excludes_later_slices() {
		let registry = registry();
		let series = registry.series_for("svcA");
		series.bucket_at(1000).record_call(10);
		series.bucket_at(2000).record_call(90);

		assert_eq!(registry.overall_average(Some(1500)).get("svcA"), Some(&10));
		assert_eq!(registry.overall_min(Some(1500)).get("svcA"), Some(&10));
		assert_eq!(registry.overall_max(Some(1500)).get("svcA"), Some(&10));
		assert_eq!(registry.overall_max(Some(2000)).get("svcA"), Some(&90));
	}

	#[test]
	fn test_unpopulated_buckets_are_invisible_to_queries() {
		let registry = registry();
		let series = registry.series_for("svcA");
		// an empty bucket, as left behind by a state change or a racing
		// writer that has not finished its first record yet
		series.bucket_at(1000);

		assert!(registry.overall_average(Some(1000)).is_empty());
		assert!(registry.overall_min(Some(1000)).is_empty());
		assert!(registry.overall_max(Some(1000)).is_empty());
		assert!(registry.percentile(0.5, Some(1000)).is_empty());

		// once populated the same bucket becomes visible
		series.bucket_at(1000).record_call(7);
		assert_eq!(registry.overall_min(Some(1000)).get("svcA"), Some(&7));
	}

	#[test]
	fn test_min_max_span_buckets() {
		let registry = registry();
		let series = registry.series_for("svcA");
		series.bucket_at(1000).record_call(50);
		series.bucket_at(1001).record_call(5);
		series.bucket_at(1002).record_call(500);

		assert_eq!(registry.overall_min(Some(1002)).get("svcA"), Some(&5));
		assert_eq!(registry.overall_max(Some(1002)).get("svcA"), Some(&500));
	}

	#[test]
	fn test_percentile_above_cutoff_is_rejected() {
		let registry = registry();
		registry.series_for("svcA").bucket_at(1000).record_call(10);

		assert!(
			registry.percentile(0.995, Some(1000)).is_empty(),
			"percentiles above the cutoff must return an empty mapping"
		);
	}

	#[test]
	fn test_percentile_takes_lowest_fraction_of_slice_averages() {
		let registry = registry();
		let series = registry.series_for("svcA");
		// ten slices with averages 10, 20, ..., 100
		for i in 0..10u64 {
			series.bucket_at(1000 + i as i64).record_call((i + 1) * 10);
		}

		// p50 over 10 averages: mean of the lowest 5 -> 30
		let p50 = registry.percentile(0.5, Some(1009));
		assert_eq!(p50.get("svcA"), Some(&30));

		// p90: mean of the lowest 9 -> 50
		let p90 = registry.percentile(0.9, Some(1009));
		assert_eq!(p90.get("svcA"), Some(&50));
	}

	#[test]
	fn test_percentile_with_single_slice_falls_back_to_full_list() {
		let registry = registry();
		registry.series_for("svcA").bucket_at(1000).record_call(40);

		// floor(1 * 0.5) == 0: too few slices to truncate, average all
		let p50 = registry.percentile(0.5, Some(1000));
		assert_eq!(p50.get("svcA"), Some(&40));
	}

	#[test]
	fn test_state_change_creates_series_and_sticks_to_latest_bucket() {
		let registry = registry();

		// a state change may be the very first event for a key
		registry.on_circuit_state_changed("svcB", CircuitState::Open);

		assert_eq!(registry.circuit_state_of("svcB"), Some(CircuitState::Open));
		assert_eq!(registry.bucket_count("svcB"), 1);

		registry.on_circuit_state_changed("svcB", CircuitState::HalfOpen);
		assert_eq!(
			registry.circuit_state_of("svcB"),
			Some(CircuitState::HalfOpen),
			"last writer wins"
		);
	}

	#[test]
	fn test_keys_are_aggregated_independently() {
		let registry = registry();
		registry.series_for("svcA").bucket_at(1000).record_call(10);
		registry.series_for("svcB").bucket_at(1000).record_call(200);

		let averages = registry.overall_average(Some(1000));
		assert_eq!(averages.len(), 2);
		assert_eq!(averages.get("svcA"), Some(&10));
		assert_eq!(averages.get("svcB"), Some(&200));
	}

	#[test]
	fn test_round_half_up() {
		assert_eq!(round_half_up(25.5, 0), 26.0);
		assert_eq!(round_half_up(25.4, 0), 25.0);
		assert_eq!(round_half_up(1.0 / 3.0, 2), 0.33);
		assert_eq!(round_half_up(0.125, 2), 0.13);
	}
}
