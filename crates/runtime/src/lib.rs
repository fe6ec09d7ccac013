//! hostlink runtime - capability-agnostic calls into a host platform
//!
//! This crate lets a program drive objects owned by a host (a browser-like
//! embedding) without caring how the host is reached:
//!
//! - **Capability probe**: one per session, deciding between in-line and
//!   asynchronous calls
//! - **Dispatch**: a single entry point for invoke/get/set/construct/release
//!   that returns the same [`Completion`] in both modes
//! - **Event channels**: reference-counted host listeners with stateful replay
//! - **Handles**: owned or borrowed references to host objects, with
//!   idempotent disposal
//! - **Connections**: an in-process adapter and a framed-pipe connection with
//!   request correlation, plus the matching [`HostEndpoint`]
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   hostlink   │  Typed objects and events
//! └──────┬───────┘
//!        │ RemoteHandle / EventChannel
//! ┌──────▼───────┐
//! │   runtime    │  This crate
//! │  ┌────────┐  │
//! │  │Dispatch│  │  Mode-selected call path
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │  Conn  │  │  In-process or pipe + correlation
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod capability;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod event_channel;
pub mod fault;
pub mod handle;
pub mod host;
pub mod in_process;
pub mod proxy;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use capability::CapabilityMode;
pub use config::SessionConfig;
pub use connection::{Connection, ConnectionLike, SyncInvoker};
pub use dispatch::{Completion, Dispatcher, Invocation, Target};
pub use error::{Error, Result};
pub use event_channel::{ChannelState, EventCallback, EventChannel, EventKind, EventSpec, SubscriberId};
pub use fault::Fault;
pub use handle::{Ownership, RemoteHandle};
pub use host::{Host, HostEndpoint, HostPeer, HostResult};
pub use in_process::InProcessConnection;
pub use proxy::{ProxyReference, ProxyRegistry, ProxyTarget};
pub use session::Session;
pub use tokio_util::sync::CancellationToken;
pub use transport::{PipeTransport, PipeTransportReceiver, PipeTransportSender, Transport, TransportParts, TransportReceiver};
