//! Rate limiting configuration

use std::time::Duration;

/// Per-key rate limit configuration. Counters are scoped to the capability
/// key id, not the client address: the key IS the principal here.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
	/// Requests allowed per window; 0 disables rate limiting entirely
	pub limit: u32,
	/// Window length
	pub window: Duration,
	/// Maximum number of keys to track (memory bound)
	pub max_tracked_keys: usize,
}

impl Default for RateLimitConfig {
	fn default() -> Self {
		Self { limit: 300, window: Duration::from_secs(60), max_tracked_keys: 16_384 }
	}
}

impl RateLimitConfig {
	pub fn disabled() -> Self {
		Self { limit: 0, ..Self::default() }
	}

	pub fn enabled(&self) -> bool {
		self.limit > 0
	}
}

// vim: ts=4
