//! Wire types for the hostlink protocol.
//!
//! This crate contains the serde-serializable types exchanged between the
//! local runtime and the host side that owns the platform objects. These types
//! represent the "protocol layer": the shapes of data as they appear on the
//! wire, plus the fixed naming convention for event activation members.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization/deserialization
//! - **Stable**: Changes only when the wire protocol changes
//!
//! Dispatch, event multiplexing and disposal are built on top of these types
//! in `hostlink-runtime`.

pub mod message;
pub mod naming;

pub use message::*;
pub use naming::*;
