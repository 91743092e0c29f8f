//! Asynchronous circuit state relay
//!
//! Circuit breakers fire state transitions on the hot path; the relay
//! decouples them from the registry by pushing each transition onto a
//! bounded channel drained by a background task. Backpressure is handled
//! by dropping: a lost transition only matters until the next one, and
//! blocking the breaker would be worse.

use crate::registry::MetricsCollector;
use loadguard_types::CircuitStateChange;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default queue depth before transitions start being dropped
pub const DEFAULT_RELAY_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum RelayError {
	#[error("relay worker has shut down")]
	Closed,
}

/// Bounded fan-in of circuit state transitions into a [`MetricsCollector`]
pub struct CircuitStateRelay {
	tx: mpsc::Sender<CircuitStateChange>,
	worker: JoinHandle<()>,
}

impl CircuitStateRelay {
	/// Spawn the relay worker on the current tokio runtime
	pub fn spawn(collector: Arc<dyn MetricsCollector>, capacity: usize) -> Self {
		let (tx, mut rx) = mpsc::channel::<CircuitStateChange>(capacity);

		let worker = tokio::spawn(async move {
			while let Some(change) = rx.recv().await {
				debug!(
					key = %change.operation_key,
					state = %change.state,
					"applying circuit state change"
				);
				collector.on_circuit_state_changed(&change.operation_key, change.state);
			}
			debug!("circuit state relay worker stopped");
		});

		Self { tx, worker }
	}

	/// Enqueue a state change without blocking.
	///
	/// A full queue drops the change with a warning; only a stopped worker
	/// is reported as an error.
	pub fn notify(&self, change: CircuitStateChange) -> Result<(), RelayError> {
		match self.tx.try_send(change) {
			Ok(()) => Ok(()),
			Err(mpsc::error::TrySendError::Full(change)) => {
				warn!(
					key = %change.operation_key,
					"relay queue full, dropping circuit state change"
				);
				Ok(())
			}
			Err(mpsc::error::TrySendError::Closed(_)) => Err(RelayError::Closed),
		}
	}

	/// Drain the queue and stop the worker
	pub async fn shutdown(self) {
		drop(self.tx);
		if let Err(e) = self.worker.await {
			warn!(error = %e, "relay worker terminated abnormally");
		}
	}
}
