//! Dual token-bucket rate limiter.
//!
//! Each principal (API key or client IP) gets its own bucket. The table
//! only guards bucket lookup/insert; each bucket guards its own
//! refill/consume under a separate lock, so concurrent requests for
//! different principals never contend.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::Instant;

struct Bucket {
    capacity: f64,
    tokens: f64,
    rate_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(rate_per_minute: u32, burst: Option<u32>) -> Self {
        let capacity = burst.unwrap_or(rate_per_minute) as f64;
        Self {
            capacity,
            tokens: capacity,
            rate_per_sec: rate_per_minute as f64 / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.capacity);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct RateLimiter {
    rate_per_minute: u32,
    burst: Option<u32>,
    buckets: DashMap<String, Mutex<Bucket>>,
}

impl RateLimiter {
    pub fn new(rate_per_minute: u32, burst: Option<u32>) -> Self {
        Self {
            rate_per_minute,
            burst,
            buckets: DashMap::new(),
        }
    }

    /// An empty principal is always allowed.
    pub fn is_allowed(&self, principal: &str) -> bool {
        if principal.is_empty() {
            return true;
        }

        let bucket = self
            .buckets
            .entry(principal.to_string())
            .or_insert_with(|| Mutex::new(Bucket::new(self.rate_per_minute, self.burst)));

        bucket.lock().unwrap().allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn allows_up_to_capacity_then_denies() {
        let limiter = RateLimiter::new(60, Some(3));
        assert!(limiter.is_allowed("key-a"));
        assert!(limiter.is_allowed("key-a"));
        assert!(limiter.is_allowed("key-a"));
        assert!(!limiter.is_allowed("key-a"));
    }

    #[test]
    fn empty_principal_always_allowed() {
        let limiter = RateLimiter::new(1, Some(1));
        for _ in 0..10 {
            assert!(limiter.is_allowed(""));
        }
    }

    #[test]
    fn principals_have_independent_buckets() {
        let limiter = RateLimiter::new(60, Some(1));
        assert!(limiter.is_allowed("a"));
        assert!(!limiter.is_allowed("a"));
        assert!(limiter.is_allowed("b"));
    }

    #[tokio::test]
    async fn refills_over_time() {
        let limiter = RateLimiter::new(6000, Some(1));
        assert!(limiter.is_allowed("key"));
        assert!(!limiter.is_allowed("key"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(limiter.is_allowed("key"));
    }
}
