//! Circuit breaker state types
//!
//! The state machine itself lives in the external breaker; this crate only
//! records the last state it was told about, per operation and time slice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Circuit breaker states as reported by the external breaker
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CircuitState {
	/// Normal operation - calls flow through
	#[default]
	Closed = 0,
	/// Trial recovery - limited calls allowed
	HalfOpen = 1,
	/// Calls rejected upstream
	Open = 2,
}

impl CircuitState {
	/// Get string representation
	pub fn as_str(&self) -> &'static str {
		match self {
			CircuitState::Closed => "closed",
			CircuitState::HalfOpen => "half_open",
			CircuitState::Open => "open",
		}
	}

	/// Raw discriminant, suitable for storage in an atomic cell
	pub fn as_u8(self) -> u8 {
		self as u8
	}

	/// Rebuild from a raw discriminant; unknown values map to `Closed`
	pub fn from_u8(raw: u8) -> Self {
		match raw {
			1 => CircuitState::HalfOpen,
			2 => CircuitState::Open,
			_ => CircuitState::Closed,
		}
	}
}

impl std::fmt::Display for CircuitState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Notification carried from the external breaker into the metrics registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitStateChange {
	/// Operation key the transition applies to
	pub operation_key: String,
	/// The state the circuit moved into
	pub state: CircuitState,
	/// When the breaker observed the transition
	pub occurred_at: DateTime<Utc>,
}

impl CircuitStateChange {
	/// Create a notification stamped with the current time
	pub fn new(operation_key: impl Into<String>, state: CircuitState) -> Self {
		Self {
			operation_key: operation_key.into(),
			state,
			occurred_at: Utc::now(),
		}
	}
}
