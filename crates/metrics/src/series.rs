//! Per-operation bucket series
//!
//! One `OperationSeries` owns all duration buckets of a single operation
//! key, one bucket per one-second time slice. Buckets are created lazily
//! and removed only by the retention sweeper.

use crate::sweeper::{RetentionSweeper, SweepLimiter};
use chrono::Utc;
use dashmap::DashMap;
use loadguard_config::MetricsSettings;
use loadguard_types::DurationBucket;
use std::sync::Arc;

/// The current one-second time slice id (seconds since the epoch)
pub fn current_slice() -> i64 {
	Utc::now().timestamp()
}

/// Mapping from time slice to duration bucket for one operation key
#[derive(Debug)]
pub struct OperationSeries {
	buckets: Arc<DashMap<i64, Arc<DurationBucket>>>,
	settings: MetricsSettings,
	sweep_limiter: Arc<SweepLimiter>,
}

impl OperationSeries {
	pub fn new(settings: MetricsSettings, sweep_limiter: Arc<SweepLimiter>) -> Self {
		Self {
			buckets: Arc::new(DashMap::new()),
			settings,
			sweep_limiter,
		}
	}

	/// The bucket for the current time slice, created if absent
	pub fn current_bucket(&self) -> Arc<DurationBucket> {
		self.bucket_at(current_slice())
	}

	/// The bucket for a specific slice, created if absent.
	///
	/// Racing creators resolve to a single stored bucket per slice id: the
	/// cheap read is followed by an insert-if-absent through the map's
	/// entry API, so the loser of a creation race receives the winner's
	/// bucket instead of storing a second one.
	pub fn bucket_at(&self, slice_id: i64) -> Arc<DurationBucket> {
		if let Some(existing) = self.buckets.get(&slice_id) {
			return Arc::clone(existing.value());
		}

		let bucket = {
			let entry = self
				.buckets
				.entry(slice_id)
				.or_insert_with(|| Arc::new(DurationBucket::new()));
			Arc::clone(entry.value())
		};

		// past the ceiling, hand cleanup to a background sweep; the caller
		// is never blocked and overshoot is tolerated
		if self.buckets.len() > self.settings.max_bucket_count {
			RetentionSweeper::new(Arc::clone(&self.buckets), &self.settings, current_slice())
				.spawn(Arc::clone(&self.sweep_limiter));
		}

		bucket
	}

	/// Snapshot of the buckets whose slice id is at or before the boundary,
	/// letting queries exclude slices that are still filling
	pub fn buckets_up_to(&self, boundary_slice_id: i64) -> Vec<Arc<DurationBucket>> {
		self.buckets
			.iter()
			.filter(|entry| *entry.key() <= boundary_slice_id)
			.map(|entry| Arc::clone(entry.value()))
			.collect()
	}

	/// The most recently created bucket, if any
	pub fn latest_bucket(&self) -> Option<Arc<DurationBucket>> {
		self.buckets
			.iter()
			.max_by_key(|entry| *entry.key())
			.map(|entry| Arc::clone(entry.value()))
	}

	/// Number of buckets currently held
	pub fn len(&self) -> usize {
		self.buckets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.buckets.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn series_with_ceiling(max_bucket_count: usize) -> OperationSeries {
		let settings = MetricsSettings {
			max_bucket_count,
			..Default::default()
		};
		OperationSeries::new(settings, Arc::new(SweepLimiter::new()))
	}

	#[test]
	fn test_same_slice_resolves_to_one_bucket() {
		let series = series_with_ceiling(100);

		let first = series.bucket_at(1000);
		first.record_call(10);
		let second = series.bucket_at(1000);

		assert!(
			Arc::ptr_eq(&first, &second),
			"repeated lookups of one slice must return the same bucket"
		);
		assert_eq!(second.call_count(), 1);
		assert_eq!(series.len(), 1);
	}

	#[test]
	fn test_buckets_up_to_excludes_later_slices() {
		let series = series_with_ceiling(100);
		for slice_id in [1000, 1001, 1002, 1003] {
			series.bucket_at(slice_id).record_call(5);
		}

		assert_eq!(series.buckets_up_to(1001).len(), 2);
		assert_eq!(series.buckets_up_to(999).len(), 0);
		assert_eq!(series.buckets_up_to(2000).len(), 4);
	}

	#[test]
	fn test_latest_bucket_tracks_highest_slice() {
		let series = series_with_ceiling(100);
		assert!(series.latest_bucket().is_none());

		series.bucket_at(1000);
		series.bucket_at(1005).record_call(7);
		series.bucket_at(1002);

		let latest = series.latest_bucket().expect("series is not empty");
		assert_eq!(latest.call_count(), 1, "latest bucket is slice 1005");
	}

	#[tokio::test(flavor = "multi_thread")]
	async fn test_ceiling_overshoot_triggers_sweep() {
		let series = series_with_ceiling(3);
		let now = current_slice();

		// all four slices sit far below the stale boundary (now - 2)
		for offset in 10..14 {
			series.bucket_at(now - offset);
		}

		// the sweep is fire-and-forget; poll briefly for its effect
		for _ in 0..100 {
			if series.is_empty() {
				break;
			}
			tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
		}
		assert!(
			series.is_empty(),
			"stale buckets should have been swept, {} remain",
			series.len()
		);
	}

	#[test]
	fn test_no_runtime_means_sweep_is_skipped() {
		let series = series_with_ceiling(3);
		let now = current_slice();

		for offset in 10..14 {
			series.bucket_at(now - offset);
		}

		// without a runtime the sweep is dropped; the series overshoots
		// but the inserts themselves must succeed
		assert_eq!(series.len(), 4);
	}
}
