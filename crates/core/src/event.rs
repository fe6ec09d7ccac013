//! Events described as data.
//!
//! A domain wrapper declares each event it exposes once, as a type
//! implementing [`HostEvent`], and never touches activation, deactivation or
//! replay itself:
//!
//! ```ignore
//! host_event! {
//!     /// Playback reached the end of the media.
//!     pub Ended = "ended", Stateful, ()
//! }
//!
//! let _sub = media.on::<Ended, _>(|()| println!("done"))?;
//! ```

use hostlink_runtime::{EventKind, EventSpec, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Static description of one host event.
pub trait HostEvent: 'static {
	/// Event name as the host knows it (`"timeUpdate"`).
	const NAME: &'static str;
	/// Whether late subscribers receive the current state.
	const KIND: EventKind = EventKind::Instant;
	/// Decoded positional payload.
	type Payload: DeserializeOwned + Send + 'static;

	fn spec() -> EventSpec {
		match Self::KIND {
			EventKind::Instant => EventSpec::instant(Self::NAME),
			EventKind::Stateful => EventSpec::stateful(Self::NAME),
		}
	}
}

/// Decodes a positional payload.
///
/// No arguments decode from `null`, a single argument from itself, and
/// several from an array of them (so tuples work).
pub fn decode_payload<P: DeserializeOwned>(args: &[Value]) -> Result<P> {
	let value = match args {
		[] => Value::Null,
		[single] => single.clone(),
		many => Value::Array(many.to_vec()),
	};
	Ok(serde_json::from_value(value)?)
}

/// Declares a unit type implementing [`HostEvent`].
///
/// `host_event!(pub Name = "hostName", Instant | Stateful, PayloadType)`
#[macro_export]
macro_rules! host_event {
	($(#[$meta:meta])* $vis:vis $name:ident = $event:literal, $kind:ident, $payload:ty) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq)]
		$vis struct $name;

		impl $crate::HostEvent for $name {
			const NAME: &'static str = $event;
			const KIND: $crate::EventKind = $crate::EventKind::$kind;
			type Payload = $payload;
		}
	};
}
