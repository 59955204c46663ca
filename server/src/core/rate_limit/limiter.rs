//! Rate Limit Manager
//!
//! Fixed-window counters per capability key. The window algorithm is simple
//! on purpose: the API contract is the header surface (`X-RateLimit-Limit`,
//! `X-RateLimit-Remaining`, `X-RateLimit-Reset`, `Retry-After`), which needs
//! exact remaining/reset values per key.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

use super::config::RateLimitConfig;
use crate::prelude::*;

/// Snapshot returned on every check; rendered into response headers
#[derive(Clone, Copy, Debug)]
pub struct RateLimitStatus {
	pub limit: u32,
	pub remaining: u32,
	/// Epoch seconds at which the current window resets
	pub reset: u64,
}

#[derive(Clone, Copy, Debug)]
struct Window {
	started_at_ms: i64,
	count: u32,
}

#[derive(Debug)]
pub struct RateLimitManager {
	config: RateLimitConfig,
	windows: Mutex<LruCache<i64, Window>>,
}

impl RateLimitManager {
	pub fn new(config: RateLimitConfig) -> Self {
		let capacity = NonZeroUsize::new(config.max_tracked_keys.max(1))
			.unwrap_or(NonZeroUsize::MIN);
		Self { config, windows: Mutex::new(LruCache::new(capacity)) }
	}

	pub fn limit(&self) -> u32 {
		self.config.limit
	}

	/// Count one request against `key_id`. `Ok` carries the header snapshot;
	/// `Err` is the 429 with `Retry-After` populated.
	pub fn check(&self, key_id: i64) -> ApiResult<Option<RateLimitStatus>> {
		if !self.config.enabled() {
			return Ok(None);
		}

		let now_ms = Timestamp::now().0;
		let window_ms = self.config.window.as_millis() as i64;
		let mut windows = self.windows.lock();

		let window = match windows.get_mut(&key_id) {
			Some(window) if now_ms - window.started_at_ms < window_ms => window,
			_ => {
				windows.put(key_id, Window { started_at_ms: now_ms, count: 0 });
				match windows.get_mut(&key_id) {
					Some(window) => window,
					None => return Err(Error::Internal("rate limit window vanished".into())),
				}
			}
		};

		let reset = ((window.started_at_ms + window_ms) / 1000).max(0) as u64;
		if window.count >= self.config.limit {
			let retry_after =
				(((window.started_at_ms + window_ms - now_ms) + 999) / 1000).max(1) as u64;
			debug!("rate limit exceeded for key {}", key_id);
			return Err(Error::RateLimited { retry_after });
		}

		window.count += 1;
		Ok(Some(RateLimitStatus {
			limit: self.config.limit,
			remaining: self.config.limit - window.count,
			reset,
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	fn manager(limit: u32) -> RateLimitManager {
		RateLimitManager::new(RateLimitConfig {
			limit,
			window: Duration::from_secs(60),
			max_tracked_keys: 16,
		})
	}

	#[test]
	fn counts_down_remaining() {
		let m = manager(3);
		let s1 = m.check(1).unwrap().unwrap();
		assert_eq!((s1.limit, s1.remaining), (3, 2));
		let s2 = m.check(1).unwrap().unwrap();
		assert_eq!(s2.remaining, 1);
		let s3 = m.check(1).unwrap().unwrap();
		assert_eq!(s3.remaining, 0);
		assert!(matches!(m.check(1), Err(Error::RateLimited { .. })));
	}

	#[test]
	fn keys_are_independent() {
		let m = manager(1);
		assert!(m.check(1).is_ok());
		assert!(m.check(2).is_ok());
		assert!(m.check(1).is_err());
	}

	#[test]
	fn disabled_limiter_passes_everything() {
		let m = RateLimitManager::new(RateLimitConfig::disabled());
		for _ in 0..1000 {
			assert!(m.check(1).unwrap().is_none());
		}
	}
}

// vim: ts=4
