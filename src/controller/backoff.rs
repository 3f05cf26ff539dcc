//! # Fibonacci Backoff
//!
//! Retry delays that grow along the Fibonacci sequence, scaled by a minimum
//! delay and capped at a maximum: `min, min, 2min, 3min, 5min, ...`.
//!
//! Each failing object keeps its own backoff so one failing object does not
//! delay the others. A success resets it.

use std::time::Duration;

/// Per-object Fibonacci backoff state
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_secs: u64,
    max_secs: u64,
    previous: u64,
    current: u64,
}

impl FibonacciBackoff {
    /// Backoff starting at `min_secs` and never exceeding `max_secs`
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        let min_secs = min_secs.max(1);
        Self {
            min_secs,
            max_secs: max_secs.max(min_secs),
            previous: 0,
            current: 1,
        }
    }

    /// Delay for the next retry, advancing the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let delay = self.current.saturating_mul(self.min_secs).min(self.max_secs);
        if delay < self.max_secs {
            let next = self.previous.saturating_add(self.current);
            self.previous = self.current;
            self.current = next;
        }
        delay
    }

    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    pub fn reset(&mut self) {
        self.previous = 0;
        self.current = 1;
    }

    /// Delay after `error_count` consecutive errors (0-indexed), without state
    pub fn calculate_for_error_count(error_count: u32, min_secs: u64, max_secs: u64) -> Duration {
        let mut backoff = Self::new(min_secs, max_secs);
        let mut delay = backoff.next_backoff_seconds();
        for _ in 0..error_count {
            delay = backoff.next_backoff_seconds();
        }
        Duration::from_secs(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_grows_and_caps() {
        let mut backoff = FibonacciBackoff::new(5, 30);
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_backoff_seconds()).collect();
        assert_eq!(delays, vec![5, 5, 10, 15, 25, 30, 30]);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut backoff = FibonacciBackoff::new(2, 100);
        backoff.next_backoff_seconds();
        backoff.next_backoff_seconds();
        backoff.next_backoff_seconds();
        backoff.reset();
        assert_eq!(backoff.next_backoff_seconds(), 2);
    }

    #[test]
    fn test_calculate_for_error_count() {
        assert_eq!(
            FibonacciBackoff::calculate_for_error_count(0, 60, 3600),
            Duration::from_secs(60)
        );
        assert_eq!(
            FibonacciBackoff::calculate_for_error_count(4, 60, 3600),
            Duration::from_secs(300)
        );
        assert_eq!(
            FibonacciBackoff::calculate_for_error_count(50, 60, 3600),
            Duration::from_secs(3600)
        );
    }
}
