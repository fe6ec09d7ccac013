//! Capability probe.

use crate::connection::ConnectionLike;

/// Whether a connection supports synchronous re-entrant calls.
///
/// Fixed for the lifetime of a session: [`Session`](crate::Session) probes
/// once and caches the answer. A connection that changes its calling
/// convention mid-session is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityMode {
	/// Calls execute in-line on the caller's thread.
	SyncCapable,
	/// Calls require an asynchronous round trip.
	AsyncOnly,
}

impl CapabilityMode {
	/// Inspects `connection` for an in-process calling convention.
	pub fn probe(connection: &dyn ConnectionLike) -> Self {
		let mode = if connection.in_process().is_some() {
			Self::SyncCapable
		} else {
			Self::AsyncOnly
		};
		tracing::debug!(?mode, "Probed connection capability");
		mode
	}

	pub fn is_sync_capable(self) -> bool {
		self == Self::SyncCapable
	}
}

impl std::fmt::Display for CapabilityMode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::SyncCapable => write!(f, "sync"),
			Self::AsyncOnly => write!(f, "async"),
		}
	}
}
