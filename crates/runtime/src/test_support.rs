//! Scripted hosts and session wiring shared by unit tests.

use std::sync::Arc;

use hostlink_protocol::Call;
use parking_lot::Mutex;

use crate::connection::Connection;
use crate::host::{Host, HostEndpoint, HostPeer, HostResult};
use crate::in_process::InProcessConnection;
use crate::session::Session;
use crate::transport::PipeTransport;

type Responder = Box<dyn Fn(&Call, &HostPeer) -> HostResult + Send + Sync>;

/// Host that records every call and answers through a closure.
pub(crate) struct ScriptedHost {
	calls: Mutex<Vec<Call>>,
	responder: Responder,
}

impl ScriptedHost {
	pub(crate) fn new(responder: impl Fn(&Call, &HostPeer) -> HostResult + Send + Sync + 'static) -> Arc<Self> {
		Arc::new(Self {
			calls: Mutex::new(Vec::new()),
			responder: Box::new(responder),
		})
	}

	pub(crate) fn calls(&self) -> Vec<Call> {
		self.calls.lock().clone()
	}

	/// `target.member` of every call, in arrival order.
	pub(crate) fn call_ids(&self) -> Vec<String> {
		self.calls.lock().iter().map(Call::call_id).collect()
	}
}

impl Host for ScriptedHost {
	fn handle(&self, call: Call, peer: &HostPeer) -> HostResult {
		self.calls.lock().push(call.clone());
		(self.responder)(&call, peer)
	}
}

pub(crate) fn sync_session(host: Arc<dyn Host>) -> Arc<Session> {
	Session::new(Arc::new(InProcessConnection::new(host)))
}

/// Wires `host` behind a [`HostEndpoint`] over in-memory pipes. Needs a runtime.
pub(crate) fn async_session(host: Arc<dyn Host>) -> Arc<Session> {
	let (host_read, runtime_write) = tokio::io::duplex(64 * 1024);
	let (runtime_read, host_write) = tokio::io::duplex(64 * 1024);

	let (runtime_transport, runtime_rx) = PipeTransport::new(runtime_write, runtime_read);
	let connection = Arc::new(Connection::new(runtime_transport.into_transport_parts(runtime_rx)));

	let (host_transport, host_rx) = PipeTransport::new(host_write, host_read);
	let endpoint = HostEndpoint::new(host);
	tokio::spawn(async move { endpoint.serve(host_transport.into_transport_parts(host_rx)).await });

	let runner = Arc::clone(&connection);
	tokio::spawn(async move { runner.run().await });

	Session::new(connection)
}

/// Async session whose peer never answers.
pub(crate) fn silent_session() -> (Arc<Session>, tokio::io::DuplexStream, tokio::io::DuplexStream) {
	let (host_read, runtime_write) = tokio::io::duplex(64 * 1024);
	let (runtime_read, host_write) = tokio::io::duplex(64 * 1024);

	let (transport, message_rx) = PipeTransport::new(runtime_write, runtime_read);
	let connection = Arc::new(Connection::new(transport.into_transport_parts(message_rx)));

	let runner = Arc::clone(&connection);
	tokio::spawn(async move { runner.run().await });

	(Session::new(connection), host_read, host_write)
}
