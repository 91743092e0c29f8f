//! Per-slice duration accumulator
//!
//! One `DurationBucket` collects the slow calls of a single operation key
//! within a single one-second time slice. Buckets are written from many
//! threads at once and read concurrently by queries, so every field is an
//! atomic cell; no lock is ever taken. Readers may observe a bucket
//! mid-update - that is acceptable, queries only have to skip buckets whose
//! call count is still zero.

use crate::circuit::CircuitState;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Call count, duration stats and last-known circuit state for one
/// (operation key, time slice) pair.
///
/// Until the first call is recorded the duration fields are meaningless;
/// `min_duration` is internally seeded with `u64::MAX` so that concurrent
/// first writers race safely through `fetch_min`/`fetch_max` without a
/// separate "initialized" flag.
#[derive(Debug)]
pub struct DurationBucket {
	call_count: AtomicU64,
	total_duration: AtomicU64,
	min_duration: AtomicU64,
	max_duration: AtomicU64,
	circuit_state: AtomicU8,
}

impl DurationBucket {
	/// Create an empty bucket in the default `Closed` circuit state
	pub fn new() -> Self {
		Self {
			call_count: AtomicU64::new(0),
			total_duration: AtomicU64::new(0),
			min_duration: AtomicU64::new(u64::MAX),
			max_duration: AtomicU64::new(0),
			circuit_state: AtomicU8::new(CircuitState::Closed.as_u8()),
		}
	}

	/// Record one completed call of the given duration.
	///
	/// Safe to call from any number of threads; no increment is lost and
	/// min/max stay arithmetically correct regardless of interleaving.
	/// The call count is published last with release ordering so a reader
	/// that sees a non-zero count also sees the matching duration data.
	pub fn record_call(&self, duration: u64) {
		self.total_duration.fetch_add(duration, Ordering::Relaxed);
		self.min_duration.fetch_min(duration, Ordering::Relaxed);
		self.max_duration.fetch_max(duration, Ordering::Relaxed);
		self.call_count.fetch_add(1, Ordering::Release);
	}

	/// Overwrite the circuit state; last writer wins
	pub fn set_state(&self, state: CircuitState) {
		self.circuit_state.store(state.as_u8(), Ordering::Relaxed);
	}

	/// The circuit state most recently reported for this slice
	pub fn state(&self) -> CircuitState {
		CircuitState::from_u8(self.circuit_state.load(Ordering::Relaxed))
	}

	/// Number of calls recorded so far
	pub fn call_count(&self) -> u64 {
		self.call_count.load(Ordering::Acquire)
	}

	/// A bucket that has received at least one call
	pub fn is_populated(&self) -> bool {
		self.call_count() > 0
	}

	/// Sum of all recorded durations
	pub fn total_duration(&self) -> u64 {
		self.total_duration.load(Ordering::Relaxed)
	}

	/// Smallest recorded duration, 0 while the bucket is unpopulated
	pub fn min_duration(&self) -> u64 {
		if !self.is_populated() {
			return 0;
		}
		self.min_duration.load(Ordering::Relaxed)
	}

	/// Largest recorded duration, 0 while the bucket is unpopulated
	pub fn max_duration(&self) -> u64 {
		self.max_duration.load(Ordering::Relaxed)
	}

	/// Mean duration of the recorded calls, 0 while the bucket is unpopulated
	pub fn average_duration(&self) -> f64 {
		let count = self.call_count();
		if count == 0 {
			return 0.0;
		}
		self.total_duration() as f64 / count as f64
	}
}

impl Default for DurationBucket {
	fn default() -> Self {
		Self::new()
	}
}
