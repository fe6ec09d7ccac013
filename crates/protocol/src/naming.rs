//! Fixed naming convention shared by the runtime and the host side.
//!
//! - Scope-global members are addressed as `"<Scope>.<member>"`.
//! - Each event name `E` maps to the member pair `activateOn<E>` /
//!   `deactivateOn<E>` on the target, and to the proxy callback `Invoke<E>`.
//! - Disposal uses the reserved [`RELEASE`] member.

use std::borrow::Cow;

/// Reserved member used to release a remote handle.
pub const RELEASE: &str = "release";

/// Joins a scope and a member into a dotted call identifier.
pub fn scoped(scope: &str, member: &str) -> String {
	format!("{scope}.{member}")
}

/// Splits a dotted call identifier at its last `.`.
pub fn split_scoped(id: &str) -> Option<(&str, &str)> {
	id.rsplit_once('.')
		.filter(|(scope, member)| !scope.is_empty() && !member.is_empty())
}

/// Member that registers the remote listener for `event`.
pub fn activate_member(event: &str) -> String {
	format!("activateOn{}", pascal(event))
}

/// Member that removes the remote listener for `event`.
pub fn deactivate_member(event: &str) -> String {
	format!("deactivateOn{}", pascal(event))
}

/// Proxy method the host invokes to deliver `event`.
pub fn callback_method(event: &str) -> String {
	format!("Invoke{}", pascal(event))
}

fn pascal(event: &str) -> Cow<'_, str> {
	let mut chars = event.chars();
	match chars.next() {
		Some(first) if first.is_lowercase() => {
			Cow::Owned(first.to_uppercase().chain(chars).collect())
		}
		_ => Cow::Borrowed(event),
	}
}
