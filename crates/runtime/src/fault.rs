//! Unobserved-fault channel.
//!
//! Background operations (event activation, deactivation, handle release) have
//! no caller to return an error to. Their failures are logged and broadcast
//! here instead, never re-thrown into unrelated call sites.

use tokio::sync::broadcast;

use crate::error::Error;

/// Failure of a background operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
	/// Member that failed (e.g., `activateOnError`, `release`).
	pub operation: String,
	/// Handle id the operation targeted.
	pub target: String,
	/// Rendered error.
	pub message: String,
}

pub(crate) struct FaultReporter {
	tx: broadcast::Sender<Fault>,
}

impl FaultReporter {
	pub(crate) fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity.max(1));
		Self { tx }
	}

	pub(crate) fn report(&self, operation: &str, target: &str, error: &Error) {
		tracing::warn!(operation, handle = target, error = %error, "Background operation failed");
		let _ = self.tx.send(Fault {
			operation: operation.to_string(),
			target: target.to_string(),
			message: error.to_string(),
		});
	}

	pub(crate) fn subscribe(&self) -> broadcast::Receiver<Fault> {
		self.tx.subscribe()
	}
}
