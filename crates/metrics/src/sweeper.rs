//! Background retention sweeping
//!
//! A sweep removes buckets older than a stale boundary from one operation
//! series. Sweeps are best-effort: they run fire-and-forget on the ambient
//! tokio runtime, at most [`MAX_CONCURRENT_SWEEPS`] at a time, and a sweep
//! that cannot be scheduled is simply dropped - the insert that requested
//! it proceeds and accepts temporary overshoot.

use dashmap::DashMap;
use loadguard_config::MetricsSettings;
use loadguard_types::DurationBucket;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound on sweeps running at the same time per registry
pub const MAX_CONCURRENT_SWEEPS: usize = 3;

/// Shared counter of in-flight sweep tasks.
///
/// Owned by the registry and handed to every series, so the limit spans all
/// operation keys without any global state.
#[derive(Debug, Default)]
pub struct SweepLimiter {
	in_flight: AtomicUsize,
}

impl SweepLimiter {
	pub fn new() -> Self {
		Self::default()
	}

	/// Claim a sweep slot; a claim that would exceed the limit is released
	/// again immediately and the sweep is dropped.
	fn try_acquire(&self) -> bool {
		if self.in_flight.fetch_add(1, Ordering::AcqRel) + 1 > MAX_CONCURRENT_SWEEPS {
			self.in_flight.fetch_sub(1, Ordering::AcqRel);
			return false;
		}
		true
	}

	/// Give a slot back, returning how many sweeps are still running
	fn release(&self) -> usize {
		self.in_flight.fetch_sub(1, Ordering::AcqRel) - 1
	}

	/// Number of sweeps currently running
	pub fn in_flight(&self) -> usize {
		self.in_flight.load(Ordering::Acquire)
	}
}

/// One scheduled cleanup pass over a series' bucket map
pub struct RetentionSweeper {
	buckets: Arc<DashMap<i64, Arc<DurationBucket>>>,
	max_bucket_count: usize,
	stale_boundary: i64,
}

impl RetentionSweeper {
	/// Capture the target map and compute the stale boundary from the
	/// current slice, so the boundary is fixed at spawn time even if the
	/// sweep runs later.
	pub fn new(
		buckets: Arc<DashMap<i64, Arc<DurationBucket>>>,
		settings: &MetricsSettings,
		current_slice: i64,
	) -> Self {
		Self {
			buckets,
			max_bucket_count: settings.max_bucket_count,
			stale_boundary: settings.stale_boundary(current_slice),
		}
	}

	/// Schedule this sweep on the ambient tokio runtime.
	///
	/// Dropped without effect when the concurrency limit is reached or no
	/// runtime is available; both cases release the claimed slot so later
	/// sweeps are not starved.
	pub fn spawn(self, limiter: Arc<SweepLimiter>) {
		if !limiter.try_acquire() {
			debug!("retention sweep dropped, too many sweeps in flight");
			return;
		}
		let handle = match tokio::runtime::Handle::try_current() {
			Ok(handle) => handle,
			Err(_) => {
				limiter.release();
				debug!("retention sweep dropped, no async runtime available");
				return;
			},
		};
		handle.spawn(async move {
			self.run(&limiter);
		});
	}

	/// Sweep, release the slot, and clear the whole series if sweeps could
	/// not keep up. The full clear deliberately trades history for a
	/// bounded map.
	fn run(self, limiter: &SweepLimiter) {
		let removed = self.sweep();
		debug!(removed, "retention sweep finished");

		let still_running = limiter.release();
		if still_running == 0 && self.buckets.len() > self.max_bucket_count {
			warn!(
				len = self.buckets.len(),
				ceiling = self.max_bucket_count,
				"series still over ceiling after last sweep, clearing all buckets"
			);
			self.buckets.clear();
		}
	}

	/// Remove every bucket below the stale boundary, returning how many
	/// were removed. Iterates over a snapshot of the keys so the pass stays
	/// bounded even while writers keep inserting.
	fn sweep(&self) -> usize {
		let stale: Vec<i64> = self
			.buckets
			.iter()
			.map(|entry| *entry.key())
			.filter(|slice_id| *slice_id < self.stale_boundary)
			.collect();

		let mut removed = 0;
		for slice_id in stale {
			if self.buckets.remove(&slice_id).is_some() {
				removed += 1;
			}
		}
		removed
	}
}
