//! RAII event subscriptions.

use std::sync::Arc;

use hostlink_runtime::{EventChannel, SubscriberId};

/// Handle that unsubscribes its callback on drop.
///
/// Dropping after the owning object is disposed is safe: the channel is
/// already closed and the unsubscribe becomes a no-op.
pub struct Subscription {
	id: SubscriberId,
	dropper: Option<Arc<dyn Fn(SubscriberId) + Send + Sync>>,
}

impl Subscription {
	/// Creates a subscription with a custom dropper function.
	pub fn new(id: SubscriberId, dropper: Arc<dyn Fn(SubscriberId) + Send + Sync>) -> Self {
		Self {
			id,
			dropper: Some(dropper),
		}
	}

	/// Creates a subscription that removes `id` from `channel`.
	pub fn from_channel(id: SubscriberId, channel: EventChannel) -> Self {
		let dropper = Arc::new(move |id: SubscriberId| {
			channel.unsubscribe(id);
		});
		Self::new(id, dropper)
	}

	pub fn id(&self) -> SubscriberId {
		self.id
	}

	/// Keeps the callback subscribed until its channel is closed.
	pub fn detach(mut self) {
		self.dropper = None;
	}

	/// Explicitly unsubscribes. Equivalent to dropping.
	pub fn unsubscribe(mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.dropper.is_some())
			.finish()
	}
}
