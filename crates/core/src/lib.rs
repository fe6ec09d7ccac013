//! hostlink - typed host objects and events
//!
//! Domain wrappers build on three pieces:
//!
//! - [`HostObject`]: calls, properties and events on one remote object
//! - [`Scope`]: calls on a static namespace of the host
//! - [`HostEvent`] / [`host_event!`]: events declared as data
//!
//! The same wrapper code runs against an in-process host (calls complete
//! in-line) and a remote one (calls suspend); see [`connect`].
//!
//! # Example
//!
//! ```ignore
//! use hostlink::{HostObject, Scope, SessionConfig, connect, host_event};
//!
//! host_event!(pub Ended = "ended", Stateful, ());
//!
//! let session = connect::in_process(host, SessionConfig::from_env());
//! let media = Scope::new(session.dispatcher(), "Media").construct("new", []).await?;
//! let _sub = media.on::<Ended, _>(|()| println!("finished"))?;
//! media.call_void("play", []).await?;
//! media.dispose().await?;
//! ```

pub mod connect;
pub mod event;
pub mod object;
pub mod scope;
pub mod subscription;

pub use event::{HostEvent, decode_payload};
pub use hostlink_protocol as protocol;
pub use hostlink_runtime::{
	CancellationToken, CapabilityMode, ChannelState, Completion, Dispatcher, Error, EventKind, EventSpec, Fault, Host, HostEndpoint, HostPeer, HostResult,
	Invocation, Ownership, RemoteHandle, Result, Session, SessionConfig,
};
pub use object::HostObject;
pub use scope::Scope;
pub use subscription::Subscription;
