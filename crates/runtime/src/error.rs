//! Error types for the hostlink runtime.

use std::time::Duration;

use hostlink_protocol::ErrorPayload;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the hostlink runtime.
#[derive(Debug, Error)]
pub enum Error {
	/// The host threw while executing the call.
	#[error("{name} in {origin}: {message}")]
	RemoteCall {
		/// Error type name reported by the host (e.g., "TypeError")
		name: String,
		/// Human-readable error message
		message: String,
		/// Member or object the error originated from
		origin: String,
		/// Stack trace from the host (if available)
		stack: Option<String>,
	},

	/// The caller's cancellation fired before the call completed.
	#[error("Call to {0} was cancelled")]
	Cancelled(String),

	/// An asynchronous call exceeded its deadline.
	#[error("Call to {call} timed out after {}ms", after.as_millis())]
	TimedOut { call: String, after: Duration },

	/// The session is severed, or the handle was disposed.
	#[error("Disconnected from host")]
	Disconnected,

	/// A proxy callback named a proxy that is not registered.
	#[error("Unknown proxy: {0}")]
	UnknownProxy(String),

	/// A proxy was invoked with a method it does not implement.
	#[error("Proxy {proxy} has no callback named {method}")]
	UnknownCallback { proxy: String, method: String },

	/// Transport-level error (framing, pipe failures).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Protocol-level error (unexpected or malformed messages).
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Builds a [`Error::RemoteCall`] from a host error payload.
	///
	/// `call_id` is used as the origin when the host did not report one.
	pub fn remote(payload: ErrorPayload, call_id: &str) -> Self {
		Error::RemoteCall {
			name: payload.name.unwrap_or_else(|| "Error".to_string()),
			message: payload.message,
			origin: payload.origin.unwrap_or_else(|| call_id.to_string()),
			stack: payload.stack,
		}
	}

	/// Returns the origin identifier if this is a remote error.
	pub fn origin(&self) -> Option<&str> {
		match self {
			Error::RemoteCall { origin, .. } => Some(origin),
			_ => None,
		}
	}

	/// Returns the stack trace if this is a remote error with a stack.
	pub fn stack_trace(&self) -> Option<&str> {
		match self {
			Error::RemoteCall { stack, .. } => stack.as_deref(),
			_ => None,
		}
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::TimedOut { .. })
	}

	/// Returns true if this is a cancellation.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Error::Cancelled(_))
	}

	/// Returns true if the session is gone.
	pub fn is_disconnected(&self) -> bool {
		matches!(self, Error::Disconnected)
	}
}
