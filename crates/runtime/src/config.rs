//! Session configuration.

use std::time::Duration;

/// Environment variable overriding the default async call timeout, in milliseconds.
///
/// `0` disables the timeout.
pub const TIMEOUT_ENV: &str = "HOSTLINK_TIMEOUT_MS";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_FAULT_CAPACITY: usize = 64;

/// Fully owned session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
	/// Deadline applied to asynchronous calls without a per-call override.
	/// `None` waits indefinitely. Synchronous calls are never timed.
	pub default_timeout: Option<Duration>,
	/// Buffer size of the unobserved-fault broadcast channel.
	pub fault_capacity: usize,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			default_timeout: Some(DEFAULT_TIMEOUT),
			fault_capacity: DEFAULT_FAULT_CAPACITY,
		}
	}
}

impl SessionConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Defaults, with [`TIMEOUT_ENV`] applied when set.
	pub fn from_env() -> Self {
		let mut config = Self::default();
		if let Ok(raw) = std::env::var(TIMEOUT_ENV) {
			match parse_timeout_ms(&raw) {
				Some(timeout) => config.default_timeout = timeout,
				None => tracing::warn!(value = %raw, "Ignoring invalid {}", TIMEOUT_ENV),
			}
		}
		config
	}

	pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.default_timeout = timeout;
		self
	}

	pub fn with_fault_capacity(mut self, capacity: usize) -> Self {
		self.fault_capacity = capacity.max(1);
		self
	}
}

/// Parses a millisecond timeout; `Some(None)` means disabled.
fn parse_timeout_ms(raw: &str) -> Option<Option<Duration>> {
	let ms: u64 = raw.trim().parse().ok()?;
	Some((ms > 0).then(|| Duration::from_millis(ms)))
}
