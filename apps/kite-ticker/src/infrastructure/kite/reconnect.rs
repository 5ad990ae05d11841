//! Reconnection Policy
//!
//! Exponential backoff between reconnect attempts. The delay starts at the
//! minimum, doubles per attempt, and stays at the maximum once reached.
//! After `max_attempts` delays the policy is exhausted until the next
//! successful open resets it.

use std::time::Duration;

use rand::Rng;

/// Default delay before the first reconnect attempt.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(2);
/// Default upper bound on the delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);
/// Default number of attempts per disconnect episode.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;

/// Lowest accepted minimum delay.
pub const MIN_DELAY_FLOOR: Duration = Duration::from_millis(500);
/// Lowest accepted maximum delay.
pub const MAX_DELAY_FLOOR: Duration = Duration::from_secs(5);
/// Highest accepted attempt count.
pub const MAX_ATTEMPTS_CEILING: u32 = 300;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%). Zero disables it.
    pub jitter_factor: f64,
    /// Attempts allowed per disconnect episode.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    /// Create a configuration with custom values.
    #[must_use]
    pub const fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter_factor: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor,
            max_attempts,
        }
    }

    /// Clamp bounds to sane limits, logging every adjustment.
    ///
    /// The minimum delay is at least 500ms, the maximum delay at least 5s
    /// and never below the minimum, and at most 300 attempts are allowed.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        if self.initial_delay < MIN_DELAY_FLOOR {
            tracing::warn!(
                requested_ms = u64::try_from(self.initial_delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnect minimum delay raised to 500ms"
            );
            self.initial_delay = MIN_DELAY_FLOOR;
        }
        if self.max_delay < MAX_DELAY_FLOOR {
            tracing::warn!(
                requested_secs = self.max_delay.as_secs(),
                "Reconnect maximum delay raised to 5s"
            );
            self.max_delay = MAX_DELAY_FLOOR;
        }
        if self.max_delay < self.initial_delay {
            tracing::warn!("Reconnect maximum delay raised to the minimum delay");
            self.max_delay = self.initial_delay;
        }
        if self.max_attempts > MAX_ATTEMPTS_CEILING {
            tracing::warn!(
                requested = self.max_attempts,
                "Reconnect attempts capped at 300"
            );
            self.max_attempts = MAX_ATTEMPTS_CEILING;
        }
        if !(self.multiplier.is_finite() && self.multiplier >= 1.0) {
            tracing::warn!(requested = self.multiplier, "Reconnect multiplier reset to 2.0");
            self.multiplier = 2.0;
        }
        self.jitter_factor = if self.jitter_factor.is_nan() {
            0.0
        } else {
            self.jitter_factor.clamp(0.0, 1.0)
        };
        self
    }
}

/// Reconnection policy implementing exponential backoff.
///
/// # Example
///
/// ```rust
/// use kite_ticker::infrastructure::kite::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(4)));
///
/// // Successful open
/// policy.reset();
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Count an attempt and return the delay to wait before it.
    ///
    /// Returns `None` once `max_attempts` attempts have been counted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt_count >= self.config.max_attempts {
            return None;
        }

        self.attempt_count += 1;

        let delay = self.apply_jitter(self.current_delay);

        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        self.current_delay = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));

        Some(delay)
    }

    /// Reset after a successful open.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Attempts counted in the current episode.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

/// Error type for reconnection failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconnectError {
    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxAttemptsExceeded(u32),
}
