//! Exponential backoff with jitter.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use crate::config::ReconnectConfig;

/// Calculate the delay for the given attempt: `min(base * 2^attempt + jitter, ceiling)`.
pub fn calculate_backoff(attempt: u32, base: Duration, ceiling: Duration, jitter: Duration) -> Duration {
    exponential(attempt, base, ceiling)
        .saturating_add(jitter)
        .min(ceiling)
}

fn exponential(attempt: u32, base: Duration, ceiling: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(ceiling).min(ceiling)
}

/// Observable backoff progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackoffState {
    /// Delay the next computation starts from (before jitter).
    pub current_delay: Duration,
    /// Delays handed out since the last reset.
    pub attempt_count: u32,
}

/// Reconnect delay scheduler.
///
/// Deterministic apart from the jitter draw; construct it with
/// [`Backoff::with_rng`] and a seeded RNG for reproducible sequences.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
    max_jitter: Duration,
    attempts: u32,
    rng: StdRng,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: &ReconnectConfig, rng: StdRng) -> Self {
        Self {
            base: config.base_delay(),
            ceiling: config.max_delay(),
            max_jitter: config.jitter(),
            attempts: 0,
            rng,
        }
    }

    /// Compute the delay before the next attempt and advance the state.
    pub fn next_delay(&mut self) -> Duration {
        let jitter = self.draw_jitter();
        let delay = calculate_backoff(self.attempts, self.base, self.ceiling, jitter);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Return to the base delay and clear the attempt count.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// The un-jittered delay the next computation starts from.
    pub fn current_delay(&self) -> Duration {
        exponential(self.attempts, self.base, self.ceiling)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn state(&self) -> BackoffState {
        BackoffState {
            current_delay: self.current_delay(),
            attempt_count: self.attempts,
        }
    }

    fn draw_jitter(&mut self) -> Duration {
        let range_ms = self.max_jitter.as_millis() as u64;
        if range_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.rng.gen_range(0..range_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(seed: u64) -> Backoff {
        Backoff::with_rng(&ReconnectConfig::default(), StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_backoff_calculation() {
        let base = Duration::from_millis(1000);
        let ceiling = Duration::from_millis(30_000);

        assert_eq!(calculate_backoff(0, base, ceiling, Duration::ZERO), base);
        assert_eq!(
            calculate_backoff(2, base, ceiling, Duration::from_millis(250)),
            Duration::from_millis(4250)
        );
        assert_eq!(calculate_backoff(10, base, ceiling, Duration::from_millis(999)), ceiling);
        assert_eq!(calculate_backoff(u32::MAX, base, ceiling, Duration::ZERO), ceiling);
    }

    #[test]
    fn test_first_delay_after_reset_is_base_plus_jitter() {
        let mut backoff = seeded(7);
        for _ in 0..6 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.state().attempt_count, 0);

        let delay = backoff.next_delay();
        assert!(delay >= Duration::from_millis(1000));
        assert!(delay < Duration::from_millis(2000));
    }

    #[test]
    fn test_never_exceeds_ceiling() {
        for seed in 0..32 {
            let mut backoff = seeded(seed);
            for _ in 0..40 {
                assert!(backoff.next_delay() <= Duration::from_millis(30_000));
            }
        }
    }

    #[test]
    fn test_grows_until_ceiling() {
        let mut backoff = seeded(42);
        let mut previous = Duration::ZERO;
        for _ in 0..12 {
            let delay = backoff.next_delay();
            // Jitter can make one sample dip below the last, but never by a full jitter window.
            assert!(delay + Duration::from_millis(1000) > previous);
            previous = delay;
        }
        assert_eq!(backoff.current_delay(), Duration::from_millis(30_000));
    }

    #[test]
    fn test_mean_is_non_decreasing() {
        let mut sums = [0u128; 8];
        for seed in 0..200 {
            let mut backoff = seeded(seed);
            for slot in sums.iter_mut() {
                *slot += backoff.next_delay().as_millis();
            }
        }
        assert!(sums.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = seeded(3);
        let mut b = seeded(3);
        for _ in 0..5 {
            assert_eq!(a.next_delay(), b.next_delay());
        }
    }

    #[test]
    fn test_zero_jitter() {
        let config = ReconnectConfig {
            jitter_ms: 0,
            ..ReconnectConfig::default()
        };
        let mut backoff = Backoff::with_rng(&config, StdRng::seed_from_u64(0));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
        assert_eq!(backoff.attempts(), 2);
    }
}
