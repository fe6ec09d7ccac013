//! The host side of the protocol.
//!
//! A [`Host`] owns the platform objects and executes calls against them. The
//! same implementation can be reached two ways:
//!
//! - in-process, through [`InProcessConnection`](crate::InProcessConnection),
//!   where calls run on the caller's thread and callbacks re-enter the local
//!   proxies directly
//! - across a transport, through [`HostEndpoint`], which decodes requests,
//!   runs them and writes responses and callbacks back as frames
//!
//! Hosts deliver events by calling [`HostPeer::invoke_proxy`] with the proxy id
//! they received in `activateOn<Event>`.

use std::sync::{Arc, Weak};

use hostlink_protocol::{Call, ErrorPayload, Message, ProxyCall, Response, ReturnValue};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::proxy::ProxyRegistry;
use crate::transport::TransportParts;

/// Outcome of a host-side call.
pub type HostResult = std::result::Result<ReturnValue, ErrorPayload>;

/// Platform side executing calls.
pub trait Host: Send + Sync + 'static {
	/// Executes one call. `peer` reaches the proxies of the calling connection.
	fn handle(&self, call: Call, peer: &HostPeer) -> HostResult;
}

trait ProxySink: Send + Sync {
	fn send(&self, call: ProxyCall);
}

/// Route from the host back to the runtime's proxies.
#[derive(Clone)]
pub struct HostPeer {
	sink: Arc<dyn ProxySink>,
}

impl HostPeer {
	/// Peer that delivers synchronously into a local registry.
	pub(crate) fn local(proxies: &Arc<ProxyRegistry>) -> Self {
		Self {
			sink: Arc::new(LocalSink(Arc::downgrade(proxies))),
		}
	}

	fn wire(outbound: mpsc::UnboundedSender<Value>) -> Self {
		Self {
			sink: Arc::new(WireSink(outbound)),
		}
	}

	/// Calls `method` on the proxy `proxy` with positional `args`.
	pub fn invoke_proxy(&self, proxy: &str, method: &str, args: Vec<Value>) {
		self.sink.send(ProxyCall {
			proxy: Arc::from(proxy),
			method: method.to_string(),
			args,
		});
	}
}

impl std::fmt::Debug for HostPeer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HostPeer").finish_non_exhaustive()
	}
}

struct LocalSink(Weak<ProxyRegistry>);

impl ProxySink for LocalSink {
	fn send(&self, call: ProxyCall) {
		let Some(registry) = self.0.upgrade() else {
			return;
		};
		match registry.deliver(&call.proxy, &call.method, call.args) {
			Ok(()) => {}
			Err(Error::UnknownProxy(proxy)) => {
				tracing::debug!(proxy, method = %call.method, "Callback for released proxy (ignored)");
			}
			Err(e) => {
				tracing::warn!(proxy = %call.proxy, method = %call.method, error = %e, "Proxy callback failed");
			}
		}
	}
}

struct WireSink(mpsc::UnboundedSender<Value>);

impl ProxySink for WireSink {
	fn send(&self, call: ProxyCall) {
		match serde_json::to_value(Message::ProxyCall(call)) {
			Ok(value) => {
				if self.0.send(value).is_err() {
					tracing::debug!("Proxy callback dropped: endpoint closed");
				}
			}
			Err(e) => tracing::error!("Failed to encode proxy callback: {}", e),
		}
	}
}

/// Serves a [`Host`] over a transport.
pub struct HostEndpoint {
	host: Arc<dyn Host>,
}

impl HostEndpoint {
	pub fn new(host: Arc<dyn Host>) -> Self {
		Self { host }
	}

	/// Handles requests until the runtime side closes the transport.
	pub async fn serve(&self, parts: TransportParts) -> Result<()> {
		let TransportParts {
			sender: mut transport_sender,
			receiver,
			mut message_rx,
		} = parts;

		let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Value>();

		let reader_handle = tokio::spawn(async move {
			if let Err(e) = receiver.run().await {
				tracing::debug!("Host endpoint reader stopped: {}", e);
			}
		});

		let writer_handle = tokio::spawn(async move {
			while let Some(message) = outbound_rx.recv().await {
				if let Err(e) = transport_sender.send(message).await {
					tracing::error!("Host endpoint write error: {}", e);
					break;
				}
			}
		});

		let peer = HostPeer::wire(outbound_tx.clone());

		while let Some(value) = message_rx.recv().await {
			let request = match serde_json::from_value::<Message>(value) {
				Ok(Message::Request(request)) => request,
				Ok(other) => {
					tracing::debug!("Host endpoint ignoring non-request message: {:?}", other);
					continue;
				}
				Err(e) => {
					tracing::error!("Failed to parse request: {}", e);
					continue;
				}
			};

			tracing::debug!(id = request.id, call = %request.call.call_id(), "Host handling request");
			let outcome = self.host.handle(request.call, &peer);
			let response = serde_json::to_value(Response::from_outcome(request.id, outcome))?;
			if outbound_tx.send(response).is_err() {
				break;
			}
		}

		// Hosts may keep peers alive, so the writer never sees its channel close.
		writer_handle.abort();
		let _ = reader_handle.await;
		Ok(())
	}
}
