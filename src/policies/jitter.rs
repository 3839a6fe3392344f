//! # Jitter policy for retry delays.
//!
//! [`JitterPolicy`] randomizes backoff delays so that callers which failed
//! together do not retry together.
//!
//! - [`JitterPolicy::None`]: exact delay, predictable timing
//! - [`JitterPolicy::Symmetric`]: delay × uniform[0.5, 1.5] (transport retries)
//! - [`JitterPolicy::Additive`]: delay + uniform[0, ratio × delay] (recovery retries)

use rand::Rng;
use std::time::Duration;

/// Policy controlling randomization of retry delays.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum JitterPolicy {
    /// No jitter: use exact backoff delay.
    #[default]
    None,

    /// Scales the delay by a uniform factor in `[0.5, 1.5]`.
    ///
    /// The mean stays at the base delay; individual waits may exceed `max`.
    Symmetric,

    /// Adds up to `ratio` of the delay on top of it.
    ///
    /// The result is always `>= delay` and is capped by the caller's `max`.
    Additive {
        /// Upper bound of the added fraction (`0.3` = up to 30% longer).
        ratio: f64,
    },
}

impl JitterPolicy {
    /// Applies jitter to the given delay, clamping the result to `max`
    /// where the policy promises a cap.
    pub fn apply(&self, delay: Duration, max: Duration) -> Duration {
        match *self {
            JitterPolicy::None => delay,
            JitterPolicy::Symmetric => scale(delay, rand::rng().random_range(0.5..=1.5)),
            JitterPolicy::Additive { ratio } => {
                if !(ratio.is_finite() && ratio > 0.0) {
                    return delay.min(max);
                }
                let extra = rand::rng().random_range(0.0..=ratio);
                scale(delay, 1.0 + extra).min(max)
            }
        }
    }
}

fn scale(delay: Duration, factor: f64) -> Duration {
    let secs = delay.as_secs_f64() * factor;
    if secs.is_finite() && secs >= 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        let d = Duration::from_millis(750);
        assert_eq!(JitterPolicy::None.apply(d, Duration::from_secs(1)), d);
    }

    #[test]
    fn symmetric_stays_within_half_and_one_and_a_half() {
        let d = Duration::from_millis(1000);
        for _ in 0..200 {
            let j = JitterPolicy::Symmetric.apply(d, Duration::from_secs(60));
            assert!(j >= Duration::from_millis(500), "{j:?} below floor");
            assert!(j <= Duration::from_millis(1500), "{j:?} above ceiling");
        }
    }

    #[test]
    fn additive_never_shortens_and_respects_cap() {
        let policy = JitterPolicy::Additive { ratio: 0.3 };
        let d = Duration::from_millis(1000);
        for _ in 0..200 {
            let j = policy.apply(d, Duration::from_secs(60));
            assert!(j >= d);
            assert!(j <= Duration::from_millis(1300));
        }
        for _ in 0..50 {
            assert!(policy.apply(d, Duration::from_millis(1100)) <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn additive_with_bad_ratio_degrades_to_plain_delay() {
        let d = Duration::from_millis(10);
        let policy = JitterPolicy::Additive { ratio: f64::NAN };
        assert_eq!(policy.apply(d, Duration::from_secs(1)), d);
    }
}
