//! Token-bucket rate limiting keyed by API key id, fixed 1-second window.
//!
//! In-process only; a shared-cache-backed implementation (keyed the same
//! way, against `REDIS_URL`) is an equivalent drop-in for multi-process
//! deployments, per the request-boundary policy this enforces.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::state::keyed::DefaultKeyedStateStore;
use governor::{clock::DefaultClock, Quota, RateLimiter as GovernorLimiter};

/// Per-key-id token bucket rate limiter.
pub struct RateLimiter {
    limiter: GovernorLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>,
}

impl RateLimiter {
    /// Build a limiter with the given burst size, replenishing at the same
    /// rate per second (steady-state throughput equals the burst).
    pub fn new(burst: u32) -> Self {
        let burst = NonZeroU32::new(burst).unwrap_or_else(|| NonZeroU32::new(40).unwrap());
        let quota = Quota::per_second(burst).allow_burst(burst);
        Self {
            limiter: GovernorLimiter::keyed(quota),
        }
    }

    /// Check whether `key_id` may proceed; returns `Err(retry_after)` if the
    /// bucket is exhausted.
    pub fn check(&self, key_id: &str) -> Result<(), Duration> {
        self.limiter.check_key(&key_id.to_string()).map_err(|not_until| {
            not_until.wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
        })
    }

    /// Periodically drop buckets for keys that have not been checked
    /// recently, bounding memory for long-lived deployments.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }
}
