//! Exponential backoff for re-polling after connection-level failures.
//!
//! Used only when the application opts into retry mode; the default policy
//! is to fail fast. Delays grow geometrically and are capped:
//!
//! ```text
//! delay[n] = min(initial * multiplier^(n-1), max_delay)
//! ```
//!
//! With `initial = 500ms`, `multiplier = 2.0`, `max = 30s`:
//! 0.5s, 1s, 2s, 4s, ... 30s, 30s, ...
//!
//! A successful poll calls [`Backoff::reset`], so an isolated hiccup never
//! accumulates toward the attempt limit.

use std::time::Duration;

use thiserror::Error;

/// Returned once the attempt limit is exceeded.
#[derive(Debug, Error)]
pub enum BackoffError {
    #[error("Maximum number of attempts exceeded: {0}")]
    MaxAttemptLimitError(u32),
}

/// Retry delay controller.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,
    current_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    attempt: u32,
    /// `None` retries forever.
    max_attempts: Option<u32>,
}

impl Backoff {
    /// Creates a controller with unlimited attempts.
    ///
    /// A `multiplier` below 1.0 is clamped to 1.0 (constant delay).
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let initial = initial.min(max);
        Self {
            initial_delay: initial,
            current_delay: initial,
            max_delay: max,
            multiplier: multiplier.max(1.0),
            attempt: 0,
            max_attempts: None,
        }
    }

    /// Limits the number of consecutive attempts. `0` means unlimited.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = (max > 0).then_some(max);
        self
    }

    /// Returns the delay to wait before the next attempt and advances.
    ///
    /// # Errors
    ///
    /// `BackoffError::MaxAttemptLimitError` once the limit is exceeded.
    pub fn next_sleep(&mut self) -> Result<Duration, BackoffError> {
        self.attempt += 1;
        if let Some(limit) = self.max_attempts {
            if self.attempt > limit {
                return Err(BackoffError::MaxAttemptLimitError(limit));
            }
        }

        let sleep = self.current_delay;
        let grown = self.current_delay.as_secs_f64() * self.multiplier;
        self.current_delay = Duration::from_secs_f64(grown).min(self.max_delay);
        Ok(sleep)
    }

    /// Returns to the initial delay after a successful attempt.
    pub fn reset(&mut self) {
        self.current_delay = self.initial_delay;
        self.attempt = 0;
    }

    /// Number of attempts since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), 2.0)
    }
}
