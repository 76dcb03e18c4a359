//! Backoff delay computation
//!
//! Pure delay arithmetic: no clocks, no sleeping. The dispatch loop owns
//! the timer; this module only decides how long it should run.

use std::time::Duration;

use rand::RngExt;

/// Delay policy for retry waits.
///
/// Two paths:
/// - With an upstream hint of `s` seconds: `ceil(s * 1000ms) + hint_buffer`
/// - Without a hint: `base * 2^attempt`, capped at `max_delay`
///
/// Both paths add uniform jitter from `[0, jitter)`. The hint path is never
/// capped: the upstream named a time, so the wait honors it plus margin.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base duration for the exponential path.
    pub base: Duration,
    /// Fixed margin added on top of an upstream retry hint.
    pub hint_buffer: Duration,
    /// Exclusive upper bound of the added random jitter.
    pub jitter: Duration,
    /// Cap for the exponential path, before jitter.
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(3),
            hint_buffer: Duration::from_secs(2),
            jitter: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl BackoffPolicy {
    /// Compute the delay before the next attempt.
    ///
    /// `retry_after` is the upstream hint in seconds when one was parsed
    /// out of the error message. `attempt` is the 1-based attempt number
    /// driving the exponential path.
    pub fn delay_for<R: RngExt + ?Sized>(
        &self,
        retry_after: Option<f64>,
        attempt: u32,
        rng: &mut R,
    ) -> Duration {
        let millis = match retry_after {
            Some(seconds) => {
                let hinted = (seconds * 1000.0).ceil() as u64;
                hinted.saturating_add(self.hint_buffer.as_millis() as u64)
            }
            None => {
                let scaled = (self.base.as_millis() as u64)
                    .saturating_mul(2u64.saturating_pow(attempt));
                scaled.min(self.max_delay.as_millis() as u64)
            }
        };
        Duration::from_millis(millis.saturating_add(self.jitter_millis(rng)))
    }

    fn jitter_millis<R: RngExt + ?Sized>(&self, rng: &mut R) -> u64 {
        let bound = self.jitter.as_millis() as u64;
        if bound == 0 {
            return 0;
        }
        rng.random_range(0..bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn no_jitter() -> BackoffPolicy {
        BackoffPolicy {
            jitter: Duration::ZERO,
            ..BackoffPolicy::default()
        }
    }

    #[test]
    fn hint_delay_lands_in_the_documented_window() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let ms = policy.delay_for(Some(58.75), 1, &mut rng).as_millis() as u64;
            assert!(
                (60_750..62_750).contains(&ms),
                "hinted delay out of window: {ms}ms"
            );
        }
    }

    #[test]
    fn first_retry_window_is_six_to_eight_seconds() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let ms = policy.delay_for(None, 1, &mut rng).as_millis() as u64;
            assert!((6_000..8_000).contains(&ms), "attempt 1 delay: {ms}ms");
        }
    }

    #[test]
    fn second_retry_window_doubles() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let ms = policy.delay_for(None, 2, &mut rng).as_millis() as u64;
            assert!((12_000..14_000).contains(&ms), "attempt 2 delay: {ms}ms");
        }
    }

    #[test]
    fn zero_jitter_makes_delays_exact() {
        let policy = no_jitter();
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(
            policy.delay_for(None, 1, &mut rng),
            Duration::from_millis(6_000)
        );
        assert_eq!(
            policy.delay_for(Some(1.5), 1, &mut rng),
            Duration::from_millis(3_500)
        );
    }

    #[test]
    fn fractional_hints_round_up_to_whole_millis() {
        let policy = no_jitter();
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(
            policy.delay_for(Some(0.0011), 1, &mut rng),
            Duration::from_millis(2_002)
        );
    }

    #[test]
    fn exponential_path_is_capped() {
        let policy = no_jitter();
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(
            policy.delay_for(None, 12, &mut rng),
            Duration::from_millis(300_000)
        );
    }

    #[test]
    fn huge_attempt_numbers_saturate_instead_of_overflowing() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);
        let delay = policy.delay_for(None, u32::MAX, &mut rng);
        assert!(delay <= Duration::from_millis(302_000), "got: {delay:?}");
    }

    #[test]
    fn hint_path_is_never_capped() {
        let policy = no_jitter();
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(
            policy.delay_for(Some(3_600.0), 1, &mut rng),
            Duration::from_millis(3_602_000)
        );
    }
}
