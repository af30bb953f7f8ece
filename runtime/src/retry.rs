//! Bounded retry policy for transient failures.
//!
//! A [`RetryPolicy`] answers two questions for a chain of attempts: is another
//! attempt allowed, and how long to wait before it. The default policy spaces
//! attempts by a fixed delay; a multiplier above `1.0` turns it into
//! exponential backoff capped at `max_delay`.
//!
//! # Example
//!
//! ```rust
//! use tablebook_runtime::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .delay(Duration::from_secs(300))
//!     .build();
//!
//! assert_eq!(policy.next_delay(1), Some(Duration::from_secs(300)));
//! assert_eq!(policy.next_delay(3), None);
//! ```

use std::time::Duration;

/// Retry policy configuration.
///
/// # Default Values
///
/// - `max_attempts`: 3 (the first attempt counts)
/// - `delay`: 5 minutes
/// - `max_delay`: 1 hour
/// - `multiplier`: 1.0 (fixed spacing)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub delay: Duration,
    /// Maximum delay between retries (cap for backoff)
    pub max_delay: Duration,
    /// Multiplier applied per retry
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5 * 60),
            max_delay: Duration::from_secs(60 * 60),
            multiplier: 1.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_attempts: None,
            delay: None,
            max_delay: None,
            multiplier: None,
        }
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    #[must_use]
    pub const fn allows_another(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Delay to wait before the retry that follows `attempts_made` attempts.
    ///
    /// Returns `None` once the policy is exhausted.
    #[must_use]
    pub fn next_delay(&self, attempts_made: u32) -> Option<Duration> {
        if !self.allows_another(attempts_made) {
            return None;
        }
        Some(self.delay_for_retry(attempts_made.saturating_sub(1)))
    }

    /// Delay before the zero-based `retry`.
    ///
    /// `delay * multiplier ^ retry`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 || (self.multiplier - 1.0).abs() < f64::EPSILON {
            return self.delay;
        }

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
        let delay_ms = self.delay.as_millis() as f64 * self.multiplier.powi(retry as i32);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms as u64);

        delay.min(self.max_delay)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<u32>,
    delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set maximum number of attempts, including the first one.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set delay before the first retry.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            delay: self.delay.unwrap_or(defaults.delay),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
        }
    }
}
