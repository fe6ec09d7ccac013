//! Local callback targets reachable from the host side.
//!
//! A [`ProxyTarget`] is registered in the connection's [`ProxyRegistry`] and
//! receives a [`ProxyReference`]. The reference's id is what the host is given
//! (as `{"proxy": id}`) and what it addresses when it calls back. Dropping the
//! reference unregisters the target, so a released proxy can never be reached
//! again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use hostlink_protocol::ProxyRef;
use serde_json::Value;

use crate::error::{Error, Result};

/// Callback contract implemented by every proxy type.
///
/// The host names the method it is calling; implementations match on it and
/// return [`Error::UnknownCallback`] for anything they do not handle.
pub trait ProxyTarget: Send + Sync {
	fn invoke(&self, method: &str, args: Vec<Value>) -> Result<()>;
}

/// Per-connection table of registered proxies.
pub struct ProxyRegistry {
	targets: DashMap<Arc<str>, Arc<dyn ProxyTarget>>,
	next_id: AtomicU64,
}

impl ProxyRegistry {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			targets: DashMap::new(),
			next_id: AtomicU64::new(1),
		})
	}

	/// Registers `target` and returns the reference that keeps it reachable.
	pub fn register(self: &Arc<Self>, target: Arc<dyn ProxyTarget>) -> ProxyReference {
		let n = self.next_id.fetch_add(1, Ordering::SeqCst);
		let id: Arc<str> = Arc::from(format!("proxy@{n}"));
		self.targets.insert(Arc::clone(&id), target);
		tracing::debug!(proxy = %id, "Registered proxy");

		ProxyReference {
			id,
			registry: Arc::downgrade(self),
		}
	}

	/// Routes a host callback to its proxy.
	///
	/// The target is cloned out of the table before it runs, so callbacks may
	/// register or release proxies themselves.
	pub fn deliver(&self, proxy: &str, method: &str, args: Vec<Value>) -> Result<()> {
		let target = self
			.targets
			.get(proxy)
			.map(|entry| Arc::clone(entry.value()))
			.ok_or_else(|| Error::UnknownProxy(proxy.to_string()))?;
		target.invoke(method, args)
	}

	/// Returns true if a proxy with this id is registered.
	pub fn contains(&self, proxy: &str) -> bool {
		self.targets.contains_key(proxy)
	}

	/// Number of registered proxies.
	pub fn len(&self) -> usize {
		self.targets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.targets.is_empty()
	}

	fn unregister(&self, proxy: &str) {
		if self.targets.remove(proxy).is_some() {
			tracing::debug!(proxy, "Released proxy");
		}
	}
}

/// Registration of one proxy target; released when dropped.
pub struct ProxyReference {
	id: Arc<str>,
	registry: Weak<ProxyRegistry>,
}

impl ProxyReference {
	/// Id the host uses to address this proxy.
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Argument form handed to the host.
	pub fn to_arg(&self) -> Value {
		serde_json::to_value(ProxyRef {
			proxy: self.id.to_string(),
		})
		.unwrap_or(Value::Null)
	}

	/// Explicitly releases the proxy, equivalent to dropping it.
	pub fn release(self) {}
}

impl Drop for ProxyReference {
	fn drop(&mut self) {
		if let Some(registry) = self.registry.upgrade() {
			registry.unregister(&self.id);
		}
	}
}

impl std::fmt::Debug for ProxyReference {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ProxyReference").field("id", &self.id).finish()
	}
}
