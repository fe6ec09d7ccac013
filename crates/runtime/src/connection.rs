//! Request/response correlation layer on top of a transport.
//!
//! This module implements the asynchronous (message-passing) connection. It
//! handles:
//! - Generating unique request IDs
//! - Correlating responses with pending requests
//! - Routing host callbacks to registered proxies
//! - Failing every pending request with [`Error::Disconnected`] once the
//!   transport closes
//!
//! # Message Flow
//!
//! 1. Dispatcher calls `send_call()` with a [`Call`]
//! 2. Connection generates a unique ID and creates a oneshot channel
//! 3. Request is serialized and queued for the writer task before
//!    `send_call()` returns
//! 4. Caller awaits the oneshot receiver
//! 5. Message loop receives the response from the transport
//! 6. Response is correlated by ID and sent via the oneshot channel
//!
//! [`ConnectionLike`] is the seam the rest of the runtime programs against;
//! [`InProcessConnection`](crate::InProcessConnection) implements it for the
//! synchronous case.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::task::{Context, Poll};

use hostlink_protocol::{Call, Message, Metadata, ProxyCall, Request, Response, ReturnValue};
use serde_json::Value;
use futures_util::future::{self, BoxFuture};
use parking_lot::Mutex;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::proxy::ProxyRegistry;
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Interface the dispatcher needs from any connection to the host.
pub trait ConnectionLike: Send + Sync {
	/// Submits a call and returns a future for its outcome.
	///
	/// The call reaches the host whether or not the future is polled;
	/// requests are delivered in submission order.
	fn send_call(&self, call: Call) -> BoxFuture<'static, Result<ReturnValue>>;

	/// Returns the in-process, re-entrant calling convention if the connection has one.
	///
	/// This is what the capability probe inspects.
	fn in_process(&self) -> Option<&dyn SyncInvoker>;

	/// Proxies the host can call back into.
	fn proxies(&self) -> &Arc<ProxyRegistry>;

	/// False once the session has been severed.
	fn is_connected(&self) -> bool;
}

/// Synchronous calling convention of an in-process host.
pub trait SyncInvoker: Send + Sync {
	/// Executes the call on the caller's thread and returns its outcome.
	fn invoke_sync(&self, call: Call) -> Result<ReturnValue>;
}

struct PendingCall {
	call_id: String,
	tx: oneshot::Sender<Result<ReturnValue>>,
}

/// Pending request callbacks keyed by request ID.
type CallbackMap = Arc<Mutex<HashMap<u32, PendingCall>>>;

/// RAII guard ensuring callback cleanup when a request future is dropped.
struct CancelGuard {
	id: u32,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u32, callbacks: CallbackMap) -> Self {
		Self {
			id,
			callbacks,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}

		if self.callbacks.lock().remove(&self.id).is_some() {
			tracing::debug!(id = self.id, "CancelGuard: removed orphaned callback");
		}
	}
}

/// Future returned by [`Connection::send_call`] with automatic cancellation cleanup.
struct ResponseFuture {
	rx: oneshot::Receiver<Result<ReturnValue>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<ReturnValue>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::Disconnected).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// Asynchronous connection to an out-of-process host.
///
/// Uses sequential request IDs and oneshot channels for correlation. Never
/// offers a synchronous calling convention, so sessions over it probe as
/// [`CapabilityMode::AsyncOnly`](crate::CapabilityMode::AsyncOnly).
pub struct Connection {
	/// Sequential request ID counter
	last_id: AtomicU32,
	/// Pending request callbacks keyed by request ID
	callbacks: CallbackMap,
	/// Channel for sending outbound messages to the writer task
	outbound_tx: mpsc::UnboundedSender<Value>,
	/// Transport sender (taken by run() to start writer task)
	transport_sender: Arc<TokioMutex<Option<Box<dyn Transport>>>>,
	/// Receiver for incoming messages from transport
	message_rx: Arc<TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>>,
	/// Receiver half of transport (owned by run loop, only needed once)
	transport_receiver: Arc<TokioMutex<Option<Box<dyn TransportReceiver>>>>,
	/// Receiver for outbound messages (taken by run() to start writer task)
	outbound_rx: Arc<TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>>,
	/// Proxies reachable from the host
	proxies: Arc<ProxyRegistry>,
	/// Cleared when the message loop ends
	connected: AtomicBool,
}

impl Connection {
	/// Create a new Connection with the given transport
	pub fn new(parts: TransportParts) -> Self {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

		Self {
			last_id: AtomicU32::new(0),
			callbacks: Arc::new(Mutex::new(HashMap::new())),
			outbound_tx,
			transport_sender: Arc::new(TokioMutex::new(Some(sender))),
			message_rx: Arc::new(TokioMutex::new(Some(message_rx))),
			transport_receiver: Arc::new(TokioMutex::new(Some(receiver))),
			outbound_rx: Arc::new(TokioMutex::new(Some(outbound_rx))),
			proxies: ProxyRegistry::new(),
			connected: AtomicBool::new(true),
		}
	}

	/// Queues a call for the host and returns a future for its response.
	///
	/// The request is on the outbound queue when this returns, so dropping
	/// the future abandons only the response.
	pub fn send_call(&self, call: Call) -> BoxFuture<'static, Result<ReturnValue>> {
		match self.submit(call) {
			Ok(response) => Box::pin(response),
			Err(e) => Box::pin(future::ready(Err(e))),
		}
	}

	fn submit(&self, call: Call) -> Result<ResponseFuture> {
		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let call_id = call.call_id();

		tracing::debug!(id, call = %call_id, op = %call.op, "Sending request");

		let (tx, rx) = oneshot::channel();
		{
			// Checked under the lock so a concurrent sever() either sees this
			// entry when draining or makes us bail here.
			let mut callbacks = self.callbacks.lock();
			if !self.connected.load(Ordering::SeqCst) {
				return Err(Error::Disconnected);
			}
			callbacks.insert(id, PendingCall { call_id, tx });
		}

		let guard = CancelGuard::new(id, Arc::clone(&self.callbacks));

		let request = Request {
			id,
			call,
			metadata: Metadata::now(),
		};
		let request_value = serde_json::to_value(&request)?;

		if self.outbound_tx.send(request_value).is_err() {
			tracing::error!("Failed to queue request: outbound channel closed");
			return Err(Error::Disconnected);
		}

		Ok(ResponseFuture { rx, guard })
	}

	/// Run the message dispatch loop until the transport closes.
	///
	/// # Errors
	///
	/// Returns [`Error::ProtocolError`] if called more than once.
	pub async fn run(self: &Arc<Self>) -> Result<()> {
		let already_running = || Error::ProtocolError("run() can only be called once".to_string());

		let transport_receiver = self.transport_receiver.lock().await.take().ok_or_else(already_running)?;
		let mut transport_sender = self.transport_sender.lock().await.take().ok_or_else(already_running)?;
		let mut outbound_rx = self.outbound_rx.lock().await.take().ok_or_else(already_running)?;
		let mut message_rx = self.message_rx.lock().await.take().ok_or_else(already_running)?;

		let reader_handle = tokio::spawn(async move {
			if let Err(e) = transport_receiver.run().await {
				tracing::error!("Transport read error: {}", e);
			}
		});

		let writer_handle = tokio::spawn(async move {
			while let Some(message) = outbound_rx.recv().await {
				if let Err(e) = transport_sender.send(message).await {
					tracing::error!("Transport write error: {}", e);
					break;
				}
			}
		});

		while let Some(message_value) = message_rx.recv().await {
			match serde_json::from_value::<Message>(message_value) {
				Ok(message) => {
					if let Err(e) = self.dispatch_internal(message).await {
						tracing::error!("Error dispatching message: {}", e);
					}
				}
				Err(e) => {
					tracing::error!("Failed to parse message: {}", e);
				}
			}
		}

		self.sever().await;
		writer_handle.abort();
		let _ = reader_handle.await;
		Ok(())
	}

	/// Dispatch an incoming message (test-only public version)
	#[cfg(test)]
	pub async fn dispatch(self: &Arc<Self>, message: Message) -> Result<()> {
		self.dispatch_internal(message).await
	}

	async fn dispatch_internal(&self, message: Message) -> Result<()> {
		match message {
			Message::Response(response) => self.handle_response(response).await,
			Message::ProxyCall(call) => {
				self.handle_proxy_call(call);
				Ok(())
			}
			Message::Request(request) => Err(Error::ProtocolError(format!(
				"Unexpected request from host: id={}, member={}",
				request.id, request.call.member
			))),
			Message::Unknown(value) => {
				tracing::debug!(
					"Unknown message type (forward-compatible, ignored): {}",
					serde_json::to_string(&value).unwrap_or_else(|_| "<serialization failed>".to_string())
				);
				Ok(())
			}
		}
	}

	async fn handle_response(&self, response: Response) -> Result<()> {
		tracing::debug!("Processing response for ID: {}", response.id);
		let pending = self
			.callbacks
			.lock()
			.remove(&response.id)
			.ok_or_else(|| Error::ProtocolError(format!("Cannot find request to respond: id={}", response.id)))?;

		let result = response
			.into_outcome()
			.map_err(|payload| Error::remote(payload, &pending.call_id));

		let _ = pending.tx.send(result);
		Ok(())
	}

	fn handle_proxy_call(&self, call: ProxyCall) {
		match self.proxies.deliver(&call.proxy, &call.method, call.args) {
			Ok(()) => {}
			Err(Error::UnknownProxy(proxy)) => {
				tracing::debug!(proxy, method = %call.method, "Callback for released proxy (ignored)");
			}
			Err(e) => {
				tracing::warn!(proxy = %call.proxy, method = %call.method, error = %e, "Proxy callback failed");
			}
		}
	}

	/// Marks the session severed and fails every pending request.
	async fn sever(&self) {
		if !self.connected.swap(false, Ordering::SeqCst) {
			return;
		}
		let pending: Vec<_> = self.callbacks.lock().drain().collect();
		tracing::debug!(pending = pending.len(), "Connection closed, failing pending requests");
		for (_, call) in pending {
			let _ = call.tx.send(Err(Error::Disconnected));
		}
	}
}

impl ConnectionLike for Connection {
	fn send_call(&self, call: Call) -> BoxFuture<'static, Result<ReturnValue>> {
		Connection::send_call(self, call)
	}

	fn in_process(&self) -> Option<&dyn SyncInvoker> {
		None
	}

	fn proxies(&self) -> &Arc<ProxyRegistry> {
		&self.proxies
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}
}
