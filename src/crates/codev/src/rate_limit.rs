//! Token-bucket rate limiting for session creation
//!
//! Creation is limited per caller; resume and status calls are exempt.
//! Each caller key gets its own bucket that refills continuously over the
//! configured period.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Bucket {
    capacity: usize,
    tokens: f64,
    refill_period: Duration,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: usize, refill_period: Duration) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            refill_period,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        if elapsed >= self.refill_period {
            self.tokens = self.capacity as f64;
        } else {
            let ratio = elapsed.as_secs_f64() / self.refill_period.as_secs_f64();
            self.tokens = (self.tokens + self.capacity as f64 * ratio).min(self.capacity as f64);
        }
        self.last_refill = now;
    }

    fn try_take(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-caller token buckets.
#[derive(Clone)]
pub struct RateLimiter {
    capacity: usize,
    period: Duration,
    buckets: Arc<Mutex<HashMap<String, Bucket>>>,
}

impl RateLimiter {
    pub fn new(max_operations: usize, period: Duration) -> Self {
        Self {
            capacity: max_operations,
            period,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Take one token for `caller`; false when the bucket is dry.
    pub async fn check(&self, caller: &str) -> bool {
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(caller.to_string())
            .or_insert_with(|| Bucket::new(self.capacity, self.period))
            .try_take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bucket_drains_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check("caller-a").await);
        assert!(limiter.check("caller-a").await);
        assert!(limiter.check("caller-a").await);
        assert!(!limiter.check("caller-a").await);
    }

    #[tokio::test]
    async fn callers_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("a").await);
        assert!(!limiter.check("a").await);
        assert!(limiter.check("b").await);
    }
}
