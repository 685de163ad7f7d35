//! Retry policies - exponential backoff for transient node failures
//!
//! Nodes signal transient failures (network timeouts, provider rate limits)
//! with [`GraphError::Retriable`](crate::error::GraphError::Retriable); the
//! runner consults the node's [`RetryPolicy`] and re-runs with exponential
//! backoff. Permanent failures are never retried.

use std::time::Duration;

/// Exponential backoff configuration.
///
/// Defaults match the engine's failure semantics: 3 attempts with 1s, 2s,
/// 4s waits between them, no jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Multiplier applied per retry
    pub backoff_factor: f64,
    /// Upper bound on any single delay
    pub max_interval: Duration,
    /// Randomize delays by +/-50% to avoid thundering herds
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(64),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another attempt is allowed after `attempts` completed tries.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before retry number `attempt` (0-based: the delay after the
    /// first failure is `calculate_delay(0)`).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = self.initial_interval.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_interval.as_secs_f64());
        let secs = if self.jitter {
            capped * (0.5 + rand::random::<f64>())
        } else {
            capped
        };
        Duration::from_secs_f64(secs)
    }
}
