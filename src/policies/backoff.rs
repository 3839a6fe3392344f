//! # Backoff policy for retried operations.
//!
//! [`BackoffPolicy`] controls how retry delays grow after repeated failures.
//! The delay for attempt `n` (0-indexed) is `first × factor^n`, clamped to
//! `max`, then jitter is applied. The base is derived from the attempt number
//! alone, so jitter output never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use resilvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//! assert_eq!(backoff.next(1), Duration::from_millis(200));
//! // 100ms × 2^10 = 102.4s → capped at max
//! assert_eq!(backoff.next(10), Duration::from_secs(10));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Exponential backoff parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Maximum delay cap (applied before jitter).
    pub max: Duration,
    /// Multiplicative growth factor (`> 1.0` for exponential growth).
    pub factor: f64,
    /// Randomization applied to the clamped base.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 1s`, `max = 60s`, `factor = 2.0`, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(60),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Un-jittered delay for `attempt`: `min(first × factor^attempt, max)`.
    ///
    /// Overflowing or non-finite products clamp to `max`.
    pub fn base(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Delay for `attempt` with jitter applied.
    pub fn next(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.base(attempt), self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(first_ms: u64, max_ms: u64, factor: f64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_millis(max_ms),
            factor,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn test_exponential_growth_no_jitter() {
        let policy = plain(100, 30_000, 2.0);
        assert_eq!(policy.next(0), Duration::from_millis(100));
        assert_eq!(policy.next(1), Duration::from_millis(200));
        assert_eq!(policy.next(2), Duration::from_millis(400));
        assert_eq!(policy.next(3), Duration::from_millis(800));
    }

    #[test]
    fn test_monotonic_and_capped() {
        let policy = plain(250, 5_000, 1.7);
        let mut prev = Duration::ZERO;
        for attempt in 0..40 {
            let d = policy.next(attempt);
            assert!(d >= prev, "attempt {attempt}: {d:?} < {prev:?}");
            assert!(d <= policy.max, "attempt {attempt}: {d:?} exceeds max");
            prev = d;
        }
        assert_eq!(prev, policy.max);
    }

    #[test]
    fn test_first_exceeds_max() {
        let policy = plain(10_000, 5_000, 2.0);
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[test]
    fn test_non_finite_overflow_clamps_to_max() {
        let policy = plain(100, 10_000, 2.0);
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_symmetric_jitter_bounds_around_base() {
        let policy = BackoffPolicy {
            jitter: JitterPolicy::Symmetric,
            ..plain(1_000, 60_000, 2.0)
        };
        for _ in 0..100 {
            let d = policy.next(1);
            assert!(d >= Duration::from_millis(1_000));
            assert!(d <= Duration::from_millis(3_000));
        }
    }
}
