//! Synchronous connection to a host living in the same process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::{BoxFuture, ready};
use hostlink_protocol::{Call, ReturnValue};

use crate::connection::{ConnectionLike, SyncInvoker};
use crate::error::{Error, Result};
use crate::host::{Host, HostPeer};
use crate::proxy::ProxyRegistry;

/// Connection that runs every call on the caller's thread.
///
/// Host callbacks re-enter the proxy registry directly, possibly while the
/// call that triggered them is still on the stack. Sessions over this
/// connection probe as [`CapabilityMode::SyncCapable`](crate::CapabilityMode::SyncCapable).
pub struct InProcessConnection {
	host: Arc<dyn Host>,
	proxies: Arc<ProxyRegistry>,
	peer: HostPeer,
	connected: AtomicBool,
}

impl InProcessConnection {
	pub fn new(host: Arc<dyn Host>) -> Self {
		let proxies = ProxyRegistry::new();
		let peer = HostPeer::local(&proxies);
		Self {
			host,
			proxies,
			peer,
			connected: AtomicBool::new(true),
		}
	}

	/// Severs the session. Every later call fails with [`Error::Disconnected`].
	pub fn disconnect(&self) {
		if self.connected.swap(false, Ordering::SeqCst) {
			tracing::debug!("In-process connection severed");
		}
	}
}

impl SyncInvoker for InProcessConnection {
	fn invoke_sync(&self, call: Call) -> Result<ReturnValue> {
		if !self.connected.load(Ordering::SeqCst) {
			return Err(Error::Disconnected);
		}
		let call_id = call.call_id();
		tracing::debug!(call = %call_id, op = %call.op, "Invoking in-process");
		self.host
			.handle(call, &self.peer)
			.map_err(|payload| Error::remote(payload, &call_id))
	}
}

impl ConnectionLike for InProcessConnection {
	fn send_call(&self, call: Call) -> BoxFuture<'static, Result<ReturnValue>> {
		Box::pin(ready(self.invoke_sync(call)))
	}

	fn in_process(&self) -> Option<&dyn SyncInvoker> {
		Some(self)
	}

	fn proxies(&self) -> &Arc<ProxyRegistry> {
		&self.proxies
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}
}
