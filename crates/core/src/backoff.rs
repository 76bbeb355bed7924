//! Exponential backoff for repeated transient failures
//!
//! The poll interval already gives the pipeline a natural retry cadence.
//! Backoff only stretches the pause while a collaborator keeps failing,
//! and collapses back to zero on the first success.

use rand::Rng;
use std::time::Duration;

/// Capped exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    /// Jitter factor (0.0-1.0) applied symmetrically around the delay
    jitter: f64,
    failures: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            jitter: 0.1,
            failures: 0,
        }
    }

    /// Disable jitter (deterministic delays)
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Record a failure and return how long to wait before retrying
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.failures.min(16);
        self.failures = self.failures.saturating_add(1);

        let base = self.initial.as_secs_f64() * 2f64.powi(exponent as i32);
        let capped = base.min(self.max.as_secs_f64());

        let offset = if self.jitter > 0.0 {
            let range = capped * self.jitter;
            rand::thread_rng().gen_range(-range..=range)
        } else {
            0.0
        };

        Duration::from_secs_f64((capped + offset).clamp(0.0, self.max.as_secs_f64()))
    }

    /// Record a success
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures since the last success
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_cap() {
        let mut backoff =
            Backoff::new(Duration::from_millis(500), Duration::from_secs(3)).without_jitter();

        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
        assert_eq!(backoff.failures(), 5);
    }

    #[test]
    fn test_reset_starts_over() {
        let mut backoff =
            Backoff::new(Duration::from_millis(100), Duration::from_secs(10)).without_jitter();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();

        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_within_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(2));
        for _ in 0..50 {
            assert!(backoff.next_delay() <= Duration::from_secs(2));
        }
    }
}
