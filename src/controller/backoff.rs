//! # Fibonacci Backoff
//!
//! Progressive retry delays for failed reconciliations. Grows more slowly than
//! exponential backoff: with a one minute step and a ten minute cap the
//! sequence is 1m, 1m, 2m, 3m, 5m, 8m, 10m, 10m, ...
//!
//! ```rust
//! use mimir_rules_controller::controller::backoff::FibonacciBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = FibonacciBackoff::new(Duration::from_secs(60), Duration::from_secs(600));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(60));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(60));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(120));
//! ```

use std::time::Duration;

/// Fibonacci sequence of delays, counted in multiples of `step`
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    step: Duration,
    max: Duration,
    prev: u32,
    current: u32,
    attempts: u32,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(step: Duration, max: Duration) -> Self {
        Self {
            step,
            max,
            prev: 0,
            current: 1,
            attempts: 0,
        }
    }

    /// Delay for the next retry; advances the sequence
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.step.saturating_mul(self.current).min(self.max);
        self.attempts = self.attempts.saturating_add(1);

        // Stop growing once the cap is reached so the counters never overflow
        if delay < self.max {
            let next = self.prev.saturating_add(self.current);
            self.prev = self.current;
            self.current = next;
        }
        delay
    }

    /// Number of delays handed out since the last reset
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.prev = 0;
        self.current = 1;
        self.attempts = 0;
    }
}
