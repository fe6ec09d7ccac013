//! Session-global namespaces.

use std::sync::Arc;

use hostlink_runtime::{Completion, Dispatcher, Invocation};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::object::HostObject;

/// A static namespace on the host (`Screen`, `Console`), addressed without a
/// handle. Members go out as `"<Scope>.<member>"`.
#[derive(Clone, Debug)]
pub struct Scope {
	name: Arc<str>,
	dispatcher: Dispatcher,
}

impl Scope {
	pub fn new(dispatcher: Dispatcher, name: impl Into<Arc<str>>) -> Self {
		Self {
			name: name.into(),
			dispatcher,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn invocation(&self, member: impl Into<String>) -> Invocation {
		Invocation::on_scope(Arc::clone(&self.name), member)
	}

	pub fn call<R>(&self, member: &str, args: impl IntoIterator<Item = Value>) -> Completion<R>
	where
		R: DeserializeOwned + Send + 'static,
	{
		self.dispatcher.invoke(self.invocation(member).args(args))
	}

	pub fn call_void(&self, member: &str, args: impl IntoIterator<Item = Value>) -> Completion<()> {
		self.dispatcher.invoke_void(self.invocation(member).args(args))
	}

	pub fn get<R>(&self, property: &str) -> Completion<R>
	where
		R: DeserializeOwned + Send + 'static,
	{
		self.dispatcher.get_property(self.invocation(property))
	}

	pub fn set(&self, property: &str, value: impl Into<Value>) -> Completion<()> {
		self.dispatcher.set_property(self.invocation(property), value)
	}

	/// Constructs an owned object through `<Scope>.<constructor>`.
	pub fn construct(&self, constructor: &str, args: impl IntoIterator<Item = Value>) -> Completion<HostObject> {
		HostObject::construct(&self.dispatcher, self.invocation(constructor).args(args))
	}
}
