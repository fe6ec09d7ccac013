//! Remote object handles and their disposal.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::capability::CapabilityMode;
use crate::dispatch::{Completion, Dispatcher, Invocation};
use crate::error::{Error, Result};
use crate::event_channel::{EventCallback, EventChannel, EventSpec, SubscriberId};

/// Whether disposing a handle releases the remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
	/// Created through `construct`; the remote object is released on dispose.
	Owned,
	/// A view onto an object owned elsewhere; dispose only detaches listeners.
	Borrowed,
}

/// Local stand-in for a host object.
///
/// Clones share the same underlying handle. When the last clone of an
/// undisposed [`Ownership::Owned`] handle is dropped, it is disposed.
#[derive(Clone)]
pub struct RemoteHandle {
	inner: Arc<HandleInner>,
}

struct HandleInner {
	id: Arc<str>,
	ownership: Ownership,
	dispatcher: Dispatcher,
	disposed: AtomicBool,
	channels: Mutex<HashMap<Arc<str>, EventChannel>>,
	views: Mutex<Vec<Weak<HandleInner>>>,
}

impl RemoteHandle {
	pub fn owned(dispatcher: Dispatcher, id: impl Into<Arc<str>>) -> Self {
		Self::new(dispatcher, id.into(), Ownership::Owned)
	}

	pub fn borrowed(dispatcher: Dispatcher, id: impl Into<Arc<str>>) -> Self {
		Self::new(dispatcher, id.into(), Ownership::Borrowed)
	}

	fn new(dispatcher: Dispatcher, id: Arc<str>, ownership: Ownership) -> Self {
		Self {
			inner: Arc::new(HandleInner {
				id,
				ownership,
				dispatcher,
				disposed: AtomicBool::new(false),
				channels: Mutex::new(HashMap::new()),
				views: Mutex::new(Vec::new()),
			}),
		}
	}

	/// A borrowed handle to the same remote object, with its own listeners.
	///
	/// A view can be disposed on its own. Disposing the handle it was taken
	/// from disposes the view too, detaching its listeners before the remote
	/// object is released.
	pub fn view(&self) -> Self {
		let view = Self::new(self.inner.dispatcher.clone(), Arc::clone(&self.inner.id), Ownership::Borrowed);
		let mut views = self.inner.views.lock();
		if self.is_disposed() {
			view.inner.disposed.store(true, Ordering::SeqCst);
		} else {
			views.retain(|view| view.strong_count() > 0);
			views.push(Arc::downgrade(&view.inner));
		}
		view
	}

	pub fn id(&self) -> &str {
		&self.inner.id
	}

	pub fn ownership(&self) -> Ownership {
		self.inner.ownership
	}

	pub fn dispatcher(&self) -> &Dispatcher {
		&self.inner.dispatcher
	}

	pub fn is_disposed(&self) -> bool {
		self.inner.disposed.load(Ordering::SeqCst)
	}

	/// Starts an invocation of `member` on this handle.
	pub fn invocation(&self, member: impl Into<String>) -> Invocation {
		Invocation::on_handle(Arc::clone(&self.inner.id), member)
	}

	pub fn invoke<R>(&self, invocation: Invocation) -> Completion<R>
	where
		R: DeserializeOwned + Send + 'static,
	{
		match self.ensure_live() {
			Ok(()) => self.inner.dispatcher.invoke(invocation),
			Err(e) => Completion::ready(Err(e)),
		}
	}

	pub fn invoke_void(&self, invocation: Invocation) -> Completion<()> {
		match self.ensure_live() {
			Ok(()) => self.inner.dispatcher.invoke_void(invocation),
			Err(e) => Completion::ready(Err(e)),
		}
	}

	pub fn get_property<R>(&self, name: &str) -> Completion<R>
	where
		R: DeserializeOwned + Send + 'static,
	{
		match self.ensure_live() {
			Ok(()) => self.inner.dispatcher.get_property(self.invocation(name)),
			Err(e) => Completion::ready(Err(e)),
		}
	}

	pub fn set_property(&self, name: &str, value: impl Into<Value>) -> Completion<()> {
		match self.ensure_live() {
			Ok(()) => self.inner.dispatcher.set_property(self.invocation(name), value),
			Err(e) => Completion::ready(Err(e)),
		}
	}

	/// The channel for `event`, created on first use.
	pub fn channel(&self, event: &EventSpec) -> Result<EventChannel> {
		let mut channels = self.inner.channels.lock();
		self.ensure_live()?;
		let channel = channels
			.entry(Arc::from(event.name()))
			.or_insert_with(|| {
				EventChannel::new(self.inner.dispatcher.clone(), Arc::clone(&self.inner.id), event.clone())
			})
			.clone();
		Ok(channel)
	}

	/// Subscribes `callback` to `event` on this handle.
	pub fn subscribe<F>(&self, event: &EventSpec, callback: F) -> Result<SubscriberId>
	where
		F: Fn(&[Value]) + Send + Sync + 'static,
	{
		let callback: EventCallback = Arc::new(callback);
		self.channel(event)?.subscribe(callback)
	}

	/// Removes a subscription made with [`subscribe`](Self::subscribe).
	pub fn unsubscribe(&self, event: &str, id: SubscriberId) -> bool {
		let channel = self.inner.channels.lock().get(event).cloned();
		channel.is_some_and(|channel| channel.unsubscribe(id))
	}

	/// Detaches every listener and, for owned handles, releases the remote
	/// object.
	///
	/// Idempotent; every call after the first resolves immediately. Remote
	/// failures are logged and swallowed, so disposal always succeeds
	/// locally. In sync mode all teardown has happened when this returns.
	pub fn dispose(&self) -> Completion<()> {
		self.inner.dispose()
	}

	fn ensure_live(&self) -> Result<()> {
		if self.is_disposed() {
			Err(Error::Disconnected)
		} else {
			Ok(())
		}
	}
}

impl HandleInner {
	fn dispose(&self) -> Completion<()> {
		if self.disposed.swap(true, Ordering::SeqCst) {
			return Completion::ready(Ok(()));
		}
		let mut channels = Vec::new();
		self.take_channels(&mut channels);
		let deactivations: Vec<Invocation> = channels.iter().filter_map(EventChannel::close).collect();

		let session = self.dispatcher.session();
		if !session.is_connected() {
			tracing::debug!(handle = %self.id, "Session severed; skipping remote teardown");
			return Completion::ready(Ok(()));
		}

		let mut steps: Vec<(String, Completion<()>)> = deactivations
			.into_iter()
			.map(|invocation| (invocation.member().to_string(), self.dispatcher.invoke_void(invocation)))
			.collect();
		if self.ownership == Ownership::Owned {
			steps.push((hostlink_protocol::RELEASE.to_string(), self.dispatcher.release(&self.id)));
		}
		tracing::debug!(handle = %self.id, ownership = ?self.ownership, steps = steps.len(), "Disposing handle");

		let teardown = {
			let session = Arc::clone(session);
			let id = Arc::clone(&self.id);
			async move {
				for (operation, step) in steps {
					if let Err(e) = step.await {
						session.report_fault(&operation, &id, &e);
					}
				}
			}
		};

		match self.dispatcher.mode() {
			CapabilityMode::SyncCapable => {
				// Every step resolved when it was dispatched.
				let _ = teardown.now_or_never();
				Completion::ready(Ok(()))
			}
			CapabilityMode::AsyncOnly => match session.spawn_detached("dispose", &self.id, teardown) {
				Some(task) => Completion::pending(async move {
					let _ = task.await;
					Ok(())
				}),
				None => Completion::ready(Ok(())),
			},
		}
	}

	/// Drains this handle's channels and those of its live views, marking the
	/// views disposed.
	fn take_channels(&self, into: &mut Vec<EventChannel>) {
		into.extend(self.channels.lock().drain().map(|(_, channel)| channel));
		let views: Vec<Arc<HandleInner>> = self.views.lock().drain(..).filter_map(|view| view.upgrade()).collect();
		for view in views {
			if !view.disposed.swap(true, Ordering::SeqCst) {
				view.take_channels(into);
			}
		}
	}
}

impl Drop for HandleInner {
	fn drop(&mut self) {
		if self.ownership == Ownership::Owned && !self.disposed.load(Ordering::SeqCst) {
			tracing::debug!(handle = %self.id, "Disposing dropped handle");
			let _ = self.dispose();
		}
	}
}

impl std::fmt::Debug for RemoteHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RemoteHandle")
			.field("id", &self.inner.id)
			.field("ownership", &self.inner.ownership)
			.field("disposed", &self.is_disposed())
			.finish()
	}
}
