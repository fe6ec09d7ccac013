//! Per-connection session state.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::capability::CapabilityMode;
use crate::config::SessionConfig;
use crate::connection::ConnectionLike;
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::fault::{Fault, FaultReporter};

/// A connection plus everything derived from it once.
///
/// The capability mode is probed lazily on first use and cached here, so
/// every handle and channel sharing the session agrees on it.
pub struct Session {
	connection: Arc<dyn ConnectionLike>,
	mode: OnceLock<CapabilityMode>,
	config: SessionConfig,
	faults: FaultReporter,
}

impl Session {
	pub fn new(connection: Arc<dyn ConnectionLike>) -> Arc<Self> {
		Self::with_config(connection, SessionConfig::default())
	}

	pub fn with_config(connection: Arc<dyn ConnectionLike>, config: SessionConfig) -> Arc<Self> {
		let faults = FaultReporter::new(config.fault_capacity);
		Arc::new(Self {
			connection,
			mode: OnceLock::new(),
			config,
			faults,
		})
	}

	/// Capability mode of the connection, probed on first call.
	pub fn capability(&self) -> CapabilityMode {
		*self
			.mode
			.get_or_init(|| CapabilityMode::probe(self.connection.as_ref()))
	}

	pub fn connection(&self) -> &Arc<dyn ConnectionLike> {
		&self.connection
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	pub fn is_connected(&self) -> bool {
		self.connection.is_connected()
	}

	/// Creates a dispatcher bound to this session.
	pub fn dispatcher(self: &Arc<Self>) -> Dispatcher {
		Dispatcher::new(Arc::clone(self))
	}

	/// Subscribes to failures of background operations.
	pub fn faults(&self) -> broadcast::Receiver<Fault> {
		self.faults.subscribe()
	}

	pub(crate) fn report_fault(&self, operation: &str, target: &str, error: &Error) {
		self.faults.report(operation, target, error);
	}

	/// Spawns `future` on the ambient tokio runtime.
	///
	/// Returns `None` (and reports a fault) when called outside a runtime.
	pub(crate) fn spawn_detached<F>(&self, operation: &str, target: &str, future: F) -> Option<JoinHandle<F::Output>>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		match tokio::runtime::Handle::try_current() {
			Ok(handle) => Some(handle.spawn(future)),
			Err(_) => {
				self.report_fault(
					operation,
					target,
					&Error::ProtocolError("no async runtime to complete the call".to_string()),
				);
				None
			}
		}
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("mode", &self.mode.get())
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use futures_util::future::BoxFuture;
	use hostlink_protocol::{Call, ReturnValue};

	use super::*;
	use crate::connection::SyncInvoker;
	use crate::error::Result;
	use crate::proxy::ProxyRegistry;

	struct Counting {
		probes: AtomicUsize,
		proxies: Arc<ProxyRegistry>,
	}

	impl ConnectionLike for Counting {
		fn send_call(&self, _call: Call) -> BoxFuture<'static, Result<ReturnValue>> {
			Box::pin(std::future::ready(Ok(ReturnValue::Void)))
		}

		fn in_process(&self) -> Option<&dyn SyncInvoker> {
			self.probes.fetch_add(1, Ordering::SeqCst);
			None
		}

		fn proxies(&self) -> &Arc<ProxyRegistry> {
			&self.proxies
		}

		fn is_connected(&self) -> bool {
			true
		}
	}

	#[test]
	fn probes_capability_once() {
		let connection = Arc::new(Counting {
			probes: AtomicUsize::new(0),
			proxies: ProxyRegistry::new(),
		});
		let session = Session::new(connection.clone());

		assert_eq!(session.capability(), CapabilityMode::AsyncOnly);
		assert_eq!(session.capability(), CapabilityMode::AsyncOnly);
		assert_eq!(connection.probes.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn spawning_without_runtime_reports_fault() {
		let connection = Arc::new(Counting {
			probes: AtomicUsize::new(0),
			proxies: ProxyRegistry::new(),
		});
		let session = Session::new(connection);
		let mut faults = session.faults();

		assert!(session.spawn_detached("release", "obj@1", async {}).is_none());

		let fault = faults.try_recv().unwrap();
		assert_eq!(fault.operation, "release");
		assert_eq!(fault.target, "obj@1");
	}
}
