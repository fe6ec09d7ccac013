//! Typed wrapper around a remote handle.

use std::sync::Arc;

use hostlink_runtime::{Completion, Dispatcher, Invocation, Ownership, RemoteHandle, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::event::{HostEvent, decode_payload};
use crate::subscription::Subscription;

/// A host object as domain wrappers see it.
///
/// Every call goes through the session's dispatcher, so the same wrapper code
/// runs unchanged against an in-process host and a remote one.
#[derive(Clone, Debug)]
pub struct HostObject {
	handle: RemoteHandle,
}

impl HostObject {
	pub fn new(handle: RemoteHandle) -> Self {
		Self { handle }
	}

	/// Constructs a host object; the result is owned and released on dispose.
	pub fn construct(dispatcher: &Dispatcher, invocation: Invocation) -> Completion<Self> {
		dispatcher.construct(invocation).and_then(|handle| Ok(Self::new(handle)))
	}

	/// Wraps an object owned elsewhere (a module export, a global).
	pub fn borrowed(dispatcher: &Dispatcher, id: impl Into<Arc<str>>) -> Self {
		Self::new(RemoteHandle::borrowed(dispatcher.clone(), id))
	}

	pub fn handle(&self) -> &RemoteHandle {
		&self.handle
	}

	pub fn id(&self) -> &str {
		self.handle.id()
	}

	pub fn ownership(&self) -> Ownership {
		self.handle.ownership()
	}

	pub fn is_disposed(&self) -> bool {
		self.handle.is_disposed()
	}

	pub fn call<R>(&self, member: &str, args: impl IntoIterator<Item = Value>) -> Completion<R>
	where
		R: DeserializeOwned + Send + 'static,
	{
		self.handle.invoke(self.handle.invocation(member).args(args))
	}

	pub fn call_void(&self, member: &str, args: impl IntoIterator<Item = Value>) -> Completion<()> {
		self.handle.invoke_void(self.handle.invocation(member).args(args))
	}

	/// Runs a prepared invocation (for cancellation or a custom timeout).
	pub fn call_with<R>(&self, invocation: Invocation) -> Completion<R>
	where
		R: DeserializeOwned + Send + 'static,
	{
		self.handle.invoke(invocation)
	}

	pub fn get<R>(&self, property: &str) -> Completion<R>
	where
		R: DeserializeOwned + Send + 'static,
	{
		self.handle.get_property(property)
	}

	pub fn set(&self, property: &str, value: impl Into<Value>) -> Completion<()> {
		self.handle.set_property(property, value)
	}

	/// Subscribes `handler` to `E`. The subscription ends when the returned
	/// guard drops.
	///
	/// Payloads that fail to decode as `E::Payload` are logged and skipped.
	pub fn on<E, F>(&self, handler: F) -> Result<Subscription>
	where
		E: HostEvent,
		F: Fn(E::Payload) + Send + Sync + 'static,
	{
		let spec = E::spec();
		let channel = self.handle.channel(&spec)?;
		let target = self.handle.id().to_string();
		let id = channel.subscribe(Arc::new(move |args: &[Value]| match decode_payload::<E::Payload>(args) {
			Ok(payload) => handler(payload),
			Err(e) => tracing::warn!(handle = %target, event = E::NAME, error = %e, "Dropping undecodable event"),
		}))?;
		Ok(Subscription::from_channel(id, channel))
	}

	/// Borrowed view of the same object with its own subscriptions.
	pub fn view(&self) -> Self {
		Self::new(self.handle.view())
	}

	pub fn dispose(&self) -> Completion<()> {
		self.handle.dispose()
	}
}

impl From<RemoteHandle> for HostObject {
	fn from(handle: RemoteHandle) -> Self {
		Self::new(handle)
	}
}
