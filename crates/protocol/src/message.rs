//! Messages exchanged between the runtime and the host side.
//!
//! Three kinds of messages travel over a connection:
//!
//! - [`Request`]: runtime → host, one [`Call`] plus a correlation id
//! - [`Response`]: host → runtime, the outcome of a request
//! - [`ProxyCall`]: host → runtime, a callback into a registered proxy
//!
//! [`Message`] is the untagged union used when reading from the wire.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of operation a [`Call`] performs on its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
	/// Invoke a method.
	Call,
	/// Read a property.
	Get,
	/// Write a property (`args[0]` is the new value).
	Set,
	/// Construct a new object and return its handle.
	Construct,
	/// Release a handle. Uses the reserved [`RELEASE`](crate::RELEASE) member.
	Release,
}

impl std::fmt::Display for Operation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Call => write!(f, "call"),
			Self::Get => write!(f, "get"),
			Self::Set => write!(f, "set"),
			Self::Construct => write!(f, "construct"),
			Self::Release => write!(f, "release"),
		}
	}
}

/// A single operation addressed to the host, without correlation data.
///
/// Handle-targeted calls carry the handle id in `target`. Scope-global calls
/// leave `target` empty and use a dotted `"<Scope>.<member>"` identifier as
/// the member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
	/// Handle id of the target object, `None` for scope-global calls.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target: Option<String>,
	/// Operation kind.
	pub op: Operation,
	/// Member name (or dotted scope identifier).
	pub member: String,
	/// Positional, JSON-serializable arguments.
	#[serde(default)]
	pub args: Vec<Value>,
}

impl Call {
	/// Creates a call with no target and no arguments.
	pub fn new(op: Operation, member: impl Into<String>) -> Self {
		Self {
			target: None,
			op,
			member: member.into(),
			args: Vec::new(),
		}
	}

	/// Addresses the call to a handle.
	pub fn on(mut self, target: impl Into<String>) -> Self {
		self.target = Some(target.into());
		self
	}

	/// Replaces the positional arguments.
	pub fn with_args(mut self, args: Vec<Value>) -> Self {
		self.args = args;
		self
	}

	/// Returns the identifier used in logs and error origins.
	///
	/// `"<target>.<member>"` for handle calls, the member itself otherwise.
	pub fn call_id(&self) -> String {
		match &self.target {
			Some(target) => format!("{target}.{}", self.member),
			None => self.member.clone(),
		}
	}
}

/// Metadata attached to every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
	/// Unix timestamp in milliseconds
	#[serde(rename = "wallTime")]
	pub wall_time: i64,
}

impl Metadata {
	/// Create metadata with the current timestamp
	pub fn now() -> Self {
		Self {
			wall_time: std::time::SystemTime::now()
				.duration_since(std::time::UNIX_EPOCH)
				.map(|d| d.as_millis() as i64)
				.unwrap_or_default(),
		}
	}
}

/// Request message sent to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Unique request ID for correlating responses
	pub id: u32,
	/// The operation itself
	#[serde(flatten)]
	pub call: Call,
	/// Timing information
	pub metadata: Metadata,
}

/// Successful outcome of a call.
///
/// `Void` is distinct from a `null` value: it marks members that return
/// nothing at all.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnValue {
	/// The member returned nothing.
	Void,
	/// The member returned a value (possibly `null`).
	Value(Value),
}

impl ReturnValue {
	/// Returns true for the void marker.
	pub fn is_void(&self) -> bool {
		matches!(self, Self::Void)
	}

	/// Converts into a JSON value, mapping `Void` to `null`.
	pub fn into_value(self) -> Value {
		match self {
			Self::Void => Value::Null,
			Self::Value(value) => value,
		}
	}
}

impl From<Value> for ReturnValue {
	fn from(value: Value) -> Self {
		Self::Value(value)
	}
}

/// Response message from the host.
///
/// Exactly one of `result`, `void` or `error` is meaningful. A response with
/// none of them is read as a `null` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	/// Request ID this response correlates to
	pub id: u32,
	/// Success result
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	/// Zero-payload marker for members that return nothing
	#[serde(default, skip_serializing_if = "is_false")]
	pub void: bool,
	/// Error result
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorWrapper>,
}

fn is_false(value: &bool) -> bool {
	!*value
}

impl Response {
	/// Builds a response from a host-side outcome.
	pub fn from_outcome(id: u32, outcome: Result<ReturnValue, ErrorPayload>) -> Self {
		match outcome {
			Ok(ReturnValue::Void) => Self {
				id,
				result: None,
				void: true,
				error: None,
			},
			Ok(ReturnValue::Value(value)) => Self {
				id,
				result: Some(value),
				void: false,
				error: None,
			},
			Err(error) => Self {
				id,
				result: None,
				void: false,
				error: Some(ErrorWrapper { error }),
			},
		}
	}

	/// Splits the response into its outcome.
	pub fn into_outcome(self) -> Result<ReturnValue, ErrorPayload> {
		if let Some(wrapper) = self.error {
			return Err(wrapper.error);
		}
		if self.void {
			return Ok(ReturnValue::Void);
		}
		Ok(ReturnValue::Value(self.result.unwrap_or(Value::Null)))
	}
}

/// Wrapper for error payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorWrapper {
	pub error: ErrorPayload,
}

/// Error thrown on the host side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
	/// Error message
	pub message: String,
	/// Error type name (e.g., "TypeError", "NotAllowedError")
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Identifier of the member or object the error originated from
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub origin: Option<String>,
	/// Stack trace
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

impl ErrorPayload {
	/// Creates a payload with only a message.
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			name: None,
			origin: None,
			stack: None,
		}
	}

	/// Sets the error type name.
	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Sets the origin identifier.
	pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
		self.origin = Some(origin.into());
		self
	}
}

/// Callback from the host into a registered proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyCall {
	/// Proxy id the callback targets
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub proxy: Arc<str>,
	/// Callback method name (`Invoke<Event>`)
	pub method: String,
	/// Positional payload
	#[serde(default)]
	pub args: Vec<Value>,
}

/// Serde helpers for `Arc<str>` serialization
pub fn serialize_arc_str<S>(arc: &Arc<str>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
	S: serde::Serializer,
{
	serializer.serialize_str(arc)
}

pub fn deserialize_arc_str<'de, D>(deserializer: D) -> std::result::Result<Arc<str>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let s: String = serde::Deserialize::deserialize(deserializer)?;
	Ok(Arc::from(s.as_str()))
}

/// Argument shape used to pass a proxy reference to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRef {
	pub proxy: String,
}

/// Result shape of a `construct` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRef {
	pub handle: String,
}

/// Discriminated union of protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Request message (has `id`, `op` and `member`)
	Request(Request),
	/// Proxy callback (has `proxy`, no `id`)
	ProxyCall(ProxyCall),
	/// Response message (has `id`)
	Response(Response),
	/// Unknown message type (forward-compatible catch-all)
	Unknown(Value),
}
