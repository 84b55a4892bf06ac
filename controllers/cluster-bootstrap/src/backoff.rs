//! # Exponential Backoff
//!
//! Capped exponential backoff for the readiness polling loops.
//! Each delay doubles the previous one until it reaches the cap:
//! with 1s/5s the sequence is 1s, 2s, 4s, 5s, 5s, ...

use std::time::Duration;

/// Exponential backoff calculator
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// First delay (also used after reset)
    initial: Duration,
    /// Delay returned by the next call
    current: Duration,
    /// Upper bound for any delay
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a new backoff starting at `initial` and capped at `max`
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            current: initial,
            max,
        }
    }

    /// Get the next delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        result
    }

    /// Reset the backoff to the initial delay
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(5));

        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(5)); // capped
        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
    }

    #[test]
    fn test_control_plane_sequence() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(10));

        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
    }

    #[test]
    fn test_exponential_backoff_reset() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(5));

        backoff.next_backoff();
        backoff.next_backoff();
        backoff.reset();

        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
    }

    #[test]
    fn test_initial_above_cap_is_clamped() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(30), Duration::from_secs(10));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
    }
}
