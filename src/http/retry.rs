//! Retry policies for REST calls.

use std::time::Duration;

use crate::error::HttpError;

/// How many times one REST call may be attempted.
#[derive(Debug, Clone, Default)]
pub enum RetryPolicy {
    /// Single attempt. Every signed trading call uses this: placing or
    /// cancelling twice is not the same as once.
    #[default]
    None,
    /// Public reads: retried on transport failures, timeouts, 429 and
    /// 500/502/503/504.
    Idempotent,
    Custom(RetryConfig),
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Wait before the first retry. Doubles on each later one.
    pub first_wait: Duration,
    pub wait_cap: Duration,
    /// Each wait is spread by up to this fraction either way. `0.0` disables it.
    pub jitter: f64,
    pub retry_on: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            first_wait: Duration::from_millis(200),
            wait_cap: Duration::from_secs(10),
            jitter: 0.25,
            retry_on: vec![502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// The config behind [`RetryPolicy::Idempotent`]. Adds the rate
    /// limiter's 429 and a bare 500 to the gateway statuses.
    pub fn idempotent() -> Self {
        Self {
            retry_on: vec![429, 500, 502, 503, 504],
            ..Self::default()
        }
    }

    pub fn should_retry(&self, err: &HttpError) -> bool {
        match err {
            HttpError::Timeout | HttpError::Transport(_) => true,
            HttpError::Response4xx { status, .. } | HttpError::Response5xx { status, .. } => {
                self.retry_on.contains(status)
            }
            HttpError::NotJson(_) | HttpError::MaxRetriesExceeded { .. } => false,
        }
    }

    /// Wait before retry `attempt`, counting from 0.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let doubled = self
            .first_wait
            .checked_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
            .unwrap_or(self.wait_cap);
        let wait = doubled.min(self.wait_cap);
        if self.jitter <= 0.0 {
            return wait;
        }
        let spread = rand::random::<f64>() * 2.0 - 1.0;
        wait.mul_f64((1.0 + spread * self.jitter).max(0.0))
    }
}
