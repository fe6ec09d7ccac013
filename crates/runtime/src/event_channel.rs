//! Reference-counted event channels.
//!
//! One [`EventChannel`] exists per (handle, event) pair. The host-side
//! listener is attached while at least one local subscriber exists and
//! detached when the last one leaves:
//!
//! ```text
//!             first subscribe                activation done
//!  Inactive ------------------> Activating --------------------> Active
//!     ^                                                            |
//!     |      deactivation done                  last unsubscribe   |
//!     +------------------------- Deactivating <--------------------+
//! ```
//!
//! Completions that find the subscriber list changed underneath them move the
//! channel on again (an empty list after activation starts a deactivation; a
//! non-empty list after deactivation starts a new activation), so the remote
//! state always converges on the local one.
//!
//! Stateful events additionally latch their most recent payload. A subscriber
//! joining a latched channel receives it once, immediately; subscribers that
//! join before activation completes receive the host's current state when
//! it does.
//!
//! The channel lock is never held across a remote call or a subscriber
//! callback.

use std::sync::{Arc, Weak};

use hostlink_protocol::{ReturnValue, activate_member, callback_method, deactivate_member, scoped};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::dispatch::{Dispatcher, Invocation};
use crate::error::{Error, Result};
use crate::proxy::{ProxyReference, ProxyTarget};

/// Delivery semantics of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	/// Fire-and-forget occurrences (a click, an error).
	Instant,
	/// Observations of a condition; late subscribers get the current value.
	Stateful,
}

/// Static description of an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventSpec {
	name: Arc<str>,
	kind: EventKind,
}

impl EventSpec {
	pub fn instant(name: impl Into<Arc<str>>) -> Self {
		Self {
			name: name.into(),
			kind: EventKind::Instant,
		}
	}

	pub fn stateful(name: impl Into<Arc<str>>) -> Self {
		Self {
			name: name.into(),
			kind: EventKind::Stateful,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn kind(&self) -> EventKind {
		self.kind
	}

	pub fn is_stateful(&self) -> bool {
		self.kind == EventKind::Stateful
	}
}

/// Listener lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
	Inactive,
	Activating,
	Active,
	Deactivating,
}

/// Identifies one subscription on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

/// Subscriber callback; receives the positional event payload.
pub type EventCallback = Arc<dyn Fn(&[Value]) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
enum Transition {
	Activation,
	Deactivation,
}

enum Step {
	Activate(Value),
	Deactivate,
}

/// Subscriber list and listener state for one event on one handle.
#[derive(Clone)]
pub struct EventChannel {
	inner: Arc<ChannelInner>,
}

struct ChannelInner {
	target: Arc<str>,
	event: EventSpec,
	dispatcher: Dispatcher,
	core: Mutex<ChannelCore>,
}

struct ChannelCore {
	state: ChannelState,
	subscribers: IndexMap<SubscriberId, EventCallback>,
	next_id: u64,
	proxy: Option<ProxyReference>,
	latched: Option<Vec<Value>>,
	awaiting_state: Vec<SubscriberId>,
	closed: bool,
}

/// Proxy target the host calls to fire the event.
struct Relay {
	channel: Weak<ChannelInner>,
	label: String,
	method: String,
}

impl ProxyTarget for Relay {
	fn invoke(&self, method: &str, args: Vec<Value>) -> Result<()> {
		if method != self.method {
			return Err(Error::UnknownCallback {
				proxy: self.label.clone(),
				method: method.to_string(),
			});
		}
		if let Some(inner) = self.channel.upgrade() {
			EventChannel { inner }.deliver(args);
		}
		Ok(())
	}
}

impl EventChannel {
	pub fn new(dispatcher: Dispatcher, target: impl Into<Arc<str>>, event: EventSpec) -> Self {
		Self {
			inner: Arc::new(ChannelInner {
				target: target.into(),
				event,
				dispatcher,
				core: Mutex::new(ChannelCore {
					state: ChannelState::Inactive,
					subscribers: IndexMap::new(),
					next_id: 1,
					proxy: None,
					latched: None,
					awaiting_state: Vec::new(),
					closed: false,
				}),
			}),
		}
	}

	pub fn event(&self) -> &EventSpec {
		&self.inner.event
	}

	pub fn target(&self) -> &str {
		&self.inner.target
	}

	pub fn state(&self) -> ChannelState {
		self.inner.core.lock().state
	}

	pub fn subscriber_count(&self) -> usize {
		self.inner.core.lock().subscribers.len()
	}

	/// Id of the proxy currently registered with the host, if any.
	pub fn proxy_id(&self) -> Option<String> {
		self.inner.core.lock().proxy.as_ref().map(|p| p.id().to_string())
	}

	pub fn is_closed(&self) -> bool {
		self.inner.core.lock().closed
	}

	/// Adds a subscriber, activating the host listener if it is the first.
	///
	/// Fails with [`Error::Disconnected`] once the channel is closed.
	pub fn subscribe(&self, callback: EventCallback) -> Result<SubscriberId> {
		let stateful = self.inner.event.is_stateful();
		let (id, step, replay) = {
			let mut core = self.inner.core.lock();
			if core.closed {
				return Err(Error::Disconnected);
			}
			let id = SubscriberId(core.next_id);
			core.next_id += 1;
			core.subscribers.insert(id, Arc::clone(&callback));

			let mut step = None;
			let mut replay = None;
			match core.state {
				ChannelState::Inactive => {
					if stateful {
						core.awaiting_state.push(id);
					}
					step = Some(self.begin_activation(&mut core));
				}
				ChannelState::Activating | ChannelState::Deactivating => {
					if stateful {
						core.awaiting_state.push(id);
					}
				}
				ChannelState::Active => {
					if stateful {
						replay = core.latched.clone();
					}
				}
			}
			(id, step, replay)
		};

		tracing::trace!(handle = %self.inner.target, event = self.inner.event.name(), ?id, "Subscribed");
		if let Some(payload) = replay {
			callback(&payload);
		}
		if let Some(step) = step {
			self.drive(step);
		}
		Ok(id)
	}

	/// Removes a subscriber. Returns false if it was not subscribed.
	///
	/// Removing the last subscriber of an active channel detaches the host
	/// listener.
	pub fn unsubscribe(&self, id: SubscriberId) -> bool {
		let (removed, step) = {
			let mut core = self.inner.core.lock();
			if core.closed {
				return false;
			}
			let removed = core.subscribers.shift_remove(&id).is_some();
			core.awaiting_state.retain(|waiting| *waiting != id);
			let step = if removed && core.subscribers.is_empty() && core.state == ChannelState::Active {
				core.state = ChannelState::Deactivating;
				Some(Step::Deactivate)
			} else {
				None
			};
			(removed, step)
		};
		if let Some(step) = step {
			self.drive(step);
		}
		removed
	}

	/// Forcibly returns the channel to Inactive and drops every subscriber.
	///
	/// Returns the deactivation the caller must issue if a host listener may
	/// be attached. Later subscribes fail and in-flight completions are
	/// ignored.
	pub fn close(&self) -> Option<Invocation> {
		let (had_listener, proxy) = {
			let mut core = self.inner.core.lock();
			if core.closed {
				return None;
			}
			core.closed = true;
			core.subscribers.clear();
			core.awaiting_state.clear();
			core.latched = None;
			let had_listener = matches!(core.state, ChannelState::Activating | ChannelState::Active);
			core.state = ChannelState::Inactive;
			(had_listener, core.proxy.take())
		};
		drop(proxy);
		had_listener.then(|| self.deactivation())
	}

	fn begin_activation(&self, core: &mut ChannelCore) -> Step {
		core.state = ChannelState::Activating;
		let relay = Arc::new(Relay {
			channel: Arc::downgrade(&self.inner),
			label: scoped(&self.inner.target, self.inner.event.name()),
			method: callback_method(self.inner.event.name()),
		});
		let proxy = self.inner.dispatcher.session().connection().proxies().register(relay);
		let arg = proxy.to_arg();
		core.proxy = Some(proxy);
		Step::Activate(arg)
	}

	fn deactivation(&self) -> Invocation {
		Invocation::on_handle(Arc::clone(&self.inner.target), deactivate_member(self.inner.event.name()))
	}

	/// Issues `step` and settles every transition that completes in-line.
	fn drive(&self, step: Step) {
		let mut next = Some(step);
		while let Some(step) = next.take() {
			if let Some((transition, result)) = self.issue(step) {
				next = self.settle(transition, result);
			}
		}
	}

	/// Starts the remote half of a transition. Returns its result when it
	/// completed in-line; otherwise a background task settles it.
	fn issue(&self, step: Step) -> Option<(Transition, Result<ReturnValue>)> {
		let dispatcher = &self.inner.dispatcher;
		let (transition, completion) = match step {
			Step::Activate(proxy) => {
				let sync = dispatcher.mode().is_sync_capable();
				let invocation =
					Invocation::on_handle(Arc::clone(&self.inner.target), activate_member(self.inner.event.name()))
						.arg(proxy)
						.arg(sync);
				(Transition::Activation, dispatcher.invoke_raw(invocation))
			}
			Step::Deactivate => (Transition::Deactivation, dispatcher.invoke_raw(self.deactivation())),
		};

		match completion.into_ready() {
			Ok(result) => Some((transition, result)),
			Err(pending) => {
				let channel = self.clone();
				let spawned = dispatcher.session().spawn_detached(
					self.operation(transition).as_str(),
					&self.inner.target,
					async move {
						let result = pending.await;
						if let Some(step) = channel.settle(transition, result) {
							channel.drive(step);
						}
					},
				);
				if spawned.is_none() {
					// Nothing will ever complete the call; converge locally.
					return Some((transition, Err(Error::Disconnected)));
				}
				None
			}
		}
	}

	/// Applies a finished transition and returns the follow-up step, if any.
	fn settle(&self, transition: Transition, result: Result<ReturnValue>) -> Option<Step> {
		if let Err(e) = &result {
			self.inner
				.dispatcher
				.session()
				.report_fault(&self.operation(transition), &self.inner.target, e);
		}

		let (step, replay, released) = {
			let mut core = self.inner.core.lock();
			if core.closed {
				return None;
			}
			match transition {
				Transition::Activation => {
					core.state = ChannelState::Active;
					let mut replay = None;
					if self.inner.event.is_stateful() {
						let waiting = std::mem::take(&mut core.awaiting_state);
						if let Some(payload) = result.ok().and_then(current_state) {
							core.latched = Some(payload.clone());
							let callbacks: Vec<EventCallback> = waiting
								.iter()
								.filter_map(|id| core.subscribers.get(id).cloned())
								.collect();
							replay = Some((callbacks, payload));
						}
					}
					let step = if core.subscribers.is_empty() {
						core.state = ChannelState::Deactivating;
						Some(Step::Deactivate)
					} else {
						None
					};
					(step, replay, None)
				}
				Transition::Deactivation => {
					let released = core.proxy.take();
					core.state = ChannelState::Inactive;
					core.latched = None;
					let step = if core.subscribers.is_empty() {
						None
					} else {
						Some(self.begin_activation(&mut core))
					};
					(step, None, released)
				}
			}
		};

		drop(released);
		tracing::debug!(
			handle = %self.inner.target,
			event = self.inner.event.name(),
			?transition,
			"Channel transition settled"
		);
		if let Some((callbacks, payload)) = replay {
			for callback in callbacks {
				callback(&payload);
			}
		}
		step
	}

	fn deliver(&self, args: Vec<Value>) {
		let callbacks: Vec<EventCallback> = {
			let mut core = self.inner.core.lock();
			if core.closed {
				return;
			}
			if self.inner.event.is_stateful() {
				core.latched = Some(args.clone());
			}
			core.subscribers.values().cloned().collect()
		};
		tracing::trace!(
			handle = %self.inner.target,
			event = self.inner.event.name(),
			subscribers = callbacks.len(),
			"Delivering event"
		);
		for callback in callbacks {
			callback(&args);
		}
	}

	fn operation(&self, transition: Transition) -> String {
		match transition {
			Transition::Activation => activate_member(self.inner.event.name()),
			Transition::Deactivation => deactivate_member(self.inner.event.name()),
		}
	}
}

impl std::fmt::Debug for EventChannel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventChannel")
			.field("target", &self.inner.target)
			.field("event", &self.inner.event)
			.field("state", &self.state())
			.finish_non_exhaustive()
	}
}

/// Current state of a stateful event, as returned by its activation.
///
/// `null` or void means the condition does not hold; an array is the
/// positional payload; any other value is a single argument.
fn current_state(value: ReturnValue) -> Option<Vec<Value>> {
	match value.into_value() {
		Value::Null => None,
		Value::Array(args) => Some(args),
		other => Some(vec![other]),
	}
}

#[cfg(test)]
mod tests;
