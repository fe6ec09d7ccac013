//! Session setup.

use std::sync::Arc;

use hostlink_runtime::{Connection, Host, InProcessConnection, PipeTransport, Result, Session, SessionConfig};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

/// Session over a host in this process. Calls run in-line.
pub fn in_process(host: Arc<dyn Host>, config: SessionConfig) -> Arc<Session> {
	Session::with_config(Arc::new(InProcessConnection::new(host)), config)
}

/// Session over a framed pipe to a remote host.
///
/// Spawns the connection's message loop; the returned task resolves when the
/// pipe closes. Must be called inside a tokio runtime.
pub fn over_pipe<W, R>(writer: W, reader: R, config: SessionConfig) -> (Arc<Session>, JoinHandle<Result<()>>)
where
	W: AsyncWrite + Unpin + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
{
	let (transport, message_rx) = PipeTransport::new(writer, reader);
	let connection = Arc::new(Connection::new(transport.into_transport_parts(message_rx)));

	let runner = Arc::clone(&connection);
	let task = tokio::spawn(async move { runner.run().await });
	tracing::debug!("Pipe session started");

	(Session::with_config(connection, config), task)
}
