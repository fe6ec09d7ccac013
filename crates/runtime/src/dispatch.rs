//! Capability-agnostic dispatch.
//!
//! Every remote operation goes through [`Dispatcher`], which consults the
//! session's cached [`CapabilityMode`] and either runs the call in-line or
//! issues it asynchronously. Both paths hand back a [`Completion`], so callers
//! are written once:
//!
//! ```ignore
//! let width: u32 = dispatcher.get_property(Invocation::on_scope("Screen", "width")).await?;
//! ```
//!
//! In sync mode the completion is already resolved when it is returned, and
//! awaiting it never yields. In async mode the request has been submitted when
//! it is returned; dropping the completion abandons only the response.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::BoxFuture;
use hostlink_protocol::{Call, HandleRef, Operation, RELEASE, ReturnValue, scoped};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::capability::CapabilityMode;
use crate::error::{Error, Result};
use crate::handle::RemoteHandle;
use crate::session::Session;

/// What a call is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
	/// A live remote object.
	Handle(Arc<str>),
	/// A static namespace (e.g., `Screen`); the member is sent as `Screen.width`.
	Scope(Arc<str>),
}

/// A single remote operation, before dispatch.
#[derive(Debug, Clone)]
pub struct Invocation {
	target: Target,
	member: String,
	args: Vec<Value>,
	cancellation: Option<CancellationToken>,
	timeout: Option<Duration>,
}

impl Invocation {
	pub fn new(target: Target, member: impl Into<String>) -> Self {
		Self {
			target,
			member: member.into(),
			args: Vec::new(),
			cancellation: None,
			timeout: None,
		}
	}

	pub fn on_handle(id: impl Into<Arc<str>>, member: impl Into<String>) -> Self {
		Self::new(Target::Handle(id.into()), member)
	}

	pub fn on_scope(scope: impl Into<Arc<str>>, member: impl Into<String>) -> Self {
		Self::new(Target::Scope(scope.into()), member)
	}

	/// Appends a positional argument.
	pub fn arg(mut self, value: impl Into<Value>) -> Self {
		self.args.push(value.into());
		self
	}

	/// Appends a serializable positional argument.
	pub fn try_arg<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
		self.args.push(serde_json::to_value(value)?);
		Ok(self)
	}

	pub fn args(mut self, args: impl IntoIterator<Item = Value>) -> Self {
		self.args.extend(args);
		self
	}

	/// Aborts the call when `token` fires.
	///
	/// Honored before dispatch in both modes. An in-line call, once started,
	/// runs to completion.
	pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
		self.cancellation = Some(token);
		self
	}

	/// Overrides the session's default timeout for this call.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	pub fn target(&self) -> &Target {
		&self.target
	}

	pub fn member(&self) -> &str {
		&self.member
	}

	/// `target.member` for diagnostics.
	pub fn call_id(&self) -> String {
		match &self.target {
			Target::Handle(id) => scoped(id, &self.member),
			Target::Scope(scope) => scoped(scope, &self.member),
		}
	}

	fn into_call(self, op: Operation) -> (Call, Option<CancellationToken>, Option<Duration>) {
		let call = match self.target {
			Target::Handle(id) => Call::new(op, self.member).on(&*id),
			Target::Scope(scope) => Call::new(op, scoped(&scope, &self.member)),
		};
		(call.with_args(self.args), self.cancellation, self.timeout)
	}
}

/// Result of a dispatched operation.
///
/// Resolved on return in sync mode; otherwise a pending future. Either way it
/// is awaited the same.
#[must_use = "a completion does nothing unless awaited or inspected"]
pub struct Completion<T> {
	state: State<T>,
}

enum State<T> {
	Ready(Option<Result<T>>),
	Pending(BoxFuture<'static, Result<T>>),
}

impl<T> Completion<T> {
	pub fn ready(result: Result<T>) -> Self {
		Self {
			state: State::Ready(Some(result)),
		}
	}

	pub fn pending<F>(future: F) -> Self
	where
		F: Future<Output = Result<T>> + Send + 'static,
	{
		Self {
			state: State::Pending(Box::pin(future)),
		}
	}

	/// True when the result is available without awaiting.
	pub fn is_complete(&self) -> bool {
		matches!(self.state, State::Ready(Some(_)))
	}

	/// Takes the result if already available, or hands the completion back.
	pub fn into_ready(self) -> std::result::Result<Result<T>, Self> {
		match self.state {
			State::Ready(Some(result)) => Ok(result),
			state => Err(Self { state }),
		}
	}

	/// Transforms the successful result, preserving readiness.
	pub fn and_then<U, F>(self, f: F) -> Completion<U>
	where
		T: Send + 'static,
		U: 'static,
		F: FnOnce(T) -> Result<U> + Send + 'static,
	{
		match self.state {
			State::Ready(Some(result)) => Completion::ready(result.and_then(f)),
			State::Ready(None) => Completion {
				state: State::Ready(None),
			},
			State::Pending(future) => Completion::pending(async move { future.await.and_then(f) }),
		}
	}
}

impl<T> Unpin for Completion<T> {}

impl<T> Future for Completion<T> {
	type Output = Result<T>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match &mut self.state {
			State::Ready(result) => match result.take() {
				Some(result) => Poll::Ready(result),
				None => panic!("Completion polled after it resolved"),
			},
			State::Pending(future) => future.as_mut().poll(cx),
		}
	}
}

impl<T> std::fmt::Debug for Completion<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = match self.state {
			State::Ready(Some(_)) => "ready",
			State::Ready(None) => "taken",
			State::Pending(_) => "pending",
		};
		f.debug_struct("Completion").field("state", &state).finish()
	}
}

/// Single entry point for remote operations.
#[derive(Clone, Debug)]
pub struct Dispatcher {
	session: Arc<Session>,
}

impl Dispatcher {
	pub fn new(session: Arc<Session>) -> Self {
		Self { session }
	}

	pub fn session(&self) -> &Arc<Session> {
		&self.session
	}

	pub fn mode(&self) -> CapabilityMode {
		self.session.capability()
	}

	/// Invokes a method and decodes its result. A void result decodes from `null`.
	pub fn invoke<R>(&self, invocation: Invocation) -> Completion<R>
	where
		R: DeserializeOwned + Send + 'static,
	{
		self.execute(Operation::Call, invocation).and_then(decode)
	}

	/// Invokes a method, discarding its result.
	pub fn invoke_void(&self, invocation: Invocation) -> Completion<()> {
		self.execute(Operation::Call, invocation).and_then(|_| Ok(()))
	}

	/// Invokes a method and returns the raw wire result.
	pub fn invoke_raw(&self, invocation: Invocation) -> Completion<ReturnValue> {
		self.execute(Operation::Call, invocation)
	}

	/// Reads the property named by the invocation's member.
	pub fn get_property<R>(&self, invocation: Invocation) -> Completion<R>
	where
		R: DeserializeOwned + Send + 'static,
	{
		self.execute(Operation::Get, invocation).and_then(decode)
	}

	/// Writes `value` to the property named by the invocation's member.
	pub fn set_property(&self, invocation: Invocation, value: impl Into<Value>) -> Completion<()> {
		self.execute(Operation::Set, invocation.arg(value)).and_then(|_| Ok(()))
	}

	/// Constructs a remote object and returns an owned handle to it.
	///
	/// The host replies with `{"handle": id}`.
	pub fn construct(&self, invocation: Invocation) -> Completion<RemoteHandle> {
		let dispatcher = self.clone();
		self.execute(Operation::Construct, invocation).and_then(move |value| {
			let reference: HandleRef = serde_json::from_value(value.into_value())?;
			Ok(RemoteHandle::owned(dispatcher, reference.handle))
		})
	}

	/// Tells the host to drop its side of `handle_id`.
	pub fn release(&self, handle_id: &str) -> Completion<()> {
		self.execute(Operation::Release, Invocation::on_handle(handle_id, RELEASE))
			.and_then(|_| Ok(()))
	}

	fn execute(&self, op: Operation, invocation: Invocation) -> Completion<ReturnValue> {
		let call_id = invocation.call_id();
		let (call, cancellation, timeout) = invocation.into_call(op);

		if cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
			return Completion::ready(Err(Error::Cancelled(call_id)));
		}

		let mode = self.mode();
		tracing::trace!(call = %call_id, %op, %mode, "Dispatching");

		match mode {
			CapabilityMode::SyncCapable => {
				let result = match self.session.connection().in_process() {
					Some(invoker) => invoker.invoke_sync(call),
					None => Err(Error::ProtocolError(format!(
						"{call_id}: sync-capable connection has no in-process invoker"
					))),
				};
				Completion::ready(result)
			}
			CapabilityMode::AsyncOnly => {
				let timeout = timeout.or(self.session.config().default_timeout);
				// Submitted now, so issue order is wire order in both modes.
				let sent = self.session.connection().send_call(call);
				Completion::pending(async move {
					let bounded = async {
						match timeout {
							Some(after) => match tokio::time::timeout(after, sent).await {
								Ok(result) => result,
								Err(_) => Err(Error::TimedOut {
									call: call_id.clone(),
									after,
								}),
							},
							None => sent.await,
						}
					};
					match cancellation {
						Some(token) => {
							tokio::select! {
								biased;
								_ = token.cancelled() => Err(Error::Cancelled(call_id.clone())),
								result = bounded => result,
							}
						}
						None => bounded.await,
					}
				})
			}
		}
	}
}

fn decode<R: DeserializeOwned>(value: ReturnValue) -> Result<R> {
	Ok(serde_json::from_value(value.into_value())?)
}
