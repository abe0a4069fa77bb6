//! Randomized exponential backoff for resubmission pacing.
//!
//! One delay value, starting at zero. Failures and stagnation grow it as
//! `(delay + floor + random(0, jitter_max)) * 2`, capped; confirmed progress
//! resets it. Jitter spreads competing agents apart so they do not resubmit
//! the same operation in lockstep.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{DEFAULT_BACKOFF_CAP, DEFAULT_BACKOFF_FLOOR, DEFAULT_JITTER_MAX};

/// Backoff tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Added before doubling; a non-zero floor makes growth strictly increasing.
    pub floor: Duration,

    /// Upper bound (exclusive) of the random term.
    pub jitter_max: Duration,

    /// Maximum delay.
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            floor: DEFAULT_BACKOFF_FLOOR,
            jitter_max: DEFAULT_JITTER_MAX,
            cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

/// Current backoff delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    delay: Duration,
    rng: StdRng,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self::from_rng(policy, StdRng::from_os_rng())
    }

    /// Deterministic jitter, for tests and reproducible runs.
    pub fn seeded(policy: BackoffPolicy, seed: u64) -> Self {
        Self::from_rng(policy, StdRng::seed_from_u64(seed))
    }

    fn from_rng(policy: BackoffPolicy, rng: StdRng) -> Self {
        Self {
            policy,
            delay: Duration::ZERO,
            rng,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Delay to wait before the next submission.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Confirmed forward progress.
    pub fn reset(&mut self) {
        self.delay = Duration::ZERO;
    }

    /// Failure or stagnation. Returns the new delay.
    pub fn grow(&mut self) -> Duration {
        let jitter_ms = self.policy.jitter_max.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(self.rng.random_range(0..jitter_ms))
        };

        let next = (self.delay + self.policy.floor + jitter).saturating_mul(2);
        self.delay = next.min(self.policy.cap);
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            floor: Duration::from_millis(100),
            jitter_max: Duration::from_millis(50),
            cap: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_starts_at_zero_and_grows_strictly_until_the_cap() {
        let mut backoff = Backoff::seeded(policy(), 7);
        assert_eq!(backoff.delay(), Duration::ZERO);

        let mut previous = Duration::ZERO;
        for _ in 0..6 {
            let next = backoff.grow();
            assert!(next > previous, "{next:?} should exceed {previous:?}");
            previous = next;
        }
    }

    #[test]
    fn test_first_growth_is_within_jitter_bounds() {
        let mut backoff = Backoff::seeded(policy(), 1);
        let first = backoff.grow();
        assert!(first >= Duration::from_millis(200));
        assert!(first < Duration::from_millis(300));
    }

    #[test]
    fn test_growth_is_capped() {
        let mut backoff = Backoff::seeded(policy(), 3);
        for _ in 0..64 {
            backoff.grow();
        }
        assert_eq!(backoff.delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_reset_returns_to_zero() {
        let mut backoff = Backoff::seeded(policy(), 5);
        backoff.grow();
        backoff.reset();
        assert_eq!(backoff.delay(), Duration::ZERO);
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let mut backoff = Backoff::seeded(
            BackoffPolicy {
                jitter_max: Duration::ZERO,
                ..policy()
            },
            0,
        );
        assert_eq!(backoff.grow(), Duration::from_millis(200));
        assert_eq!(backoff.grow(), Duration::from_millis(600));
    }
}
