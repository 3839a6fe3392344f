//! # Retry policy for the retrying transport.
//!
//! [`RetryPolicy`] is immutable per transport instance: it bounds the number
//! of attempts, shapes the delay between them and names the HTTP status codes
//! worth another try.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::policies::{BackoffPolicy, JitterPolicy};

/// Status codes retried by default: rate limiting and transient server errors.
pub const DEFAULT_RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Bounded-retry configuration.
///
/// ## Field semantics
/// - `max_retries`: retries after the first attempt (`0` = single attempt)
/// - `base_delay` / `max_delay` / `backoff_factor`: exponential backoff shape
/// - `jitter`: scale each delay by uniform[0.5, 1.5]
/// - `retryable_status_codes`: responses with these codes are retried
/// - `timeout`: hard bound on one attempt (`0s` = no bound)
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
    pub retryable_status_codes: BTreeSet<u16>,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    /// Default policy:
    ///
    /// - `max_retries = 3`
    /// - `base_delay = 1s`, `max_delay = 60s`, `backoff_factor = 2.0`
    /// - `jitter = true`
    /// - `retryable_status_codes = {429, 500, 502, 503, 504}`
    /// - `timeout = 30s`
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter: true,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS.into_iter().collect(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff derived from this policy.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            first: self.base_delay,
            max: self.max_delay,
            factor: self.backoff_factor,
            jitter: if self.jitter {
                JitterPolicy::Symmetric
            } else {
                JitterPolicy::None
            },
        }
    }

    /// Delay to wait after the failed attempt `attempt` (0-indexed).
    #[inline]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff().next(attempt)
    }

    #[inline]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// Per-attempt timeout as an `Option` (`None` when set to zero).
    #[inline]
    pub fn attempt_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Total attempts including the first one.
    #[inline]
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let p = RetryPolicy::default();
        assert_eq!(p.total_attempts(), 4);
        for code in [429, 500, 502, 503, 504] {
            assert!(p.is_retryable_status(code));
        }
        assert!(!p.is_retryable_status(404));
        assert_eq!(p.attempt_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let p = RetryPolicy {
            timeout: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert_eq!(p.attempt_timeout(), None);
    }

    #[test]
    fn delay_without_jitter_follows_formula() {
        let p = RetryPolicy {
            jitter: false,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
            ..RetryPolicy::default()
        };
        assert_eq!(p.delay_for(0), Duration::from_millis(500));
        assert_eq!(p.delay_for(1), Duration::from_millis(1000));
        assert_eq!(p.delay_for(2), Duration::from_millis(2000));
        assert_eq!(p.delay_for(3), Duration::from_secs(3));
    }
}
