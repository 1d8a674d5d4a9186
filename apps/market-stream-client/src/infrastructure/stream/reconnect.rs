//! Reconnection Policy
//!
//! Exponential backoff with positive jitter:
//! `min(initial * multiplier^attempt, max)` plus up to `jitter_factor` of
//! that on top. The attempt counter only advances when an attempt is
//! actually made, and resets on a successful connection.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectConfig {
    /// Initial delay before first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts (before jitter).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each attempt).
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (e.g., 0.2 = up to +20%).
    pub jitter_factor: f64,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.2,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Create a new configuration with custom values.
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

    /// Create configuration from `ReconnectSettings`.
    #[must_use]
    pub const fn from_settings(settings: &crate::ReconnectSettings) -> Self {
        Self {
            initial_delay: settings.initial_delay,
            max_delay: settings.max_delay,
            multiplier: settings.multiplier,
            jitter_factor: settings.jitter,
            max_attempts: settings.max_attempts,
        }
    }

    /// Delay before jitter for a zero-based attempt number.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let initial_millis = self.initial_delay.as_millis() as f64;
        #[allow(clippy::cast_precision_loss)]
        let max_millis = self.max_delay.as_millis() as f64;

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = initial_millis * self.multiplier.max(1.0).powi(exponent);
        let capped = if scaled.is_finite() {
            scaled.min(max_millis)
        } else {
            max_millis
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(capped.max(0.0).round() as u64)
    }
}

/// Reconnection policy implementing exponential backoff with jitter.
///
/// # Example
///
/// ```rust
/// use market_stream_client::infrastructure::stream::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// // Delay for the first attempt
/// let delay = policy.next_delay().unwrap();
/// assert!(delay >= Duration::from_secs(1));
///
/// // The attempt is made
/// policy.record_attempt();
/// assert_eq!(policy.attempt_count(), 1);
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, jitter included.
    ///
    /// Returns `None` if max attempts have been reached.
    #[must_use]
    pub fn next_delay(&self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        let base = self.config.base_delay(self.attempt_count);
        Some(self.apply_jitter(base))
    }

    /// Count an attempt that is being made now.
    pub const fn record_attempt(&mut self) {
        self.attempt_count = self.attempt_count.saturating_add(1);
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if reconnection should continue.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Policy configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;

        // NaN or infinite ranges would panic in the sampler
        if !jitter_range.is_finite() || jitter_range <= 0.0 {
            return duration;
        }

        let jitter: f64 = rand::rng().random_range(0.0..=jitter_range);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted = (base_millis + jitter).floor() as u64;
        Duration::from_millis(adjusted)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    fn no_jitter(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
        assert!((config.jitter_factor - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 10);
    }

    #[test]
    fn policy_exponential_backoff() {
        let mut policy = ReconnectPolicy::new(no_jitter(0));

        let mut delays = Vec::new();
        for _ in 0..4 {
            delays.push(policy.next_delay().unwrap());
            policy.record_attempt();
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
    }

    #[test]
    fn next_delay_does_not_advance() {
        let policy = ReconnectPolicy::new(no_jitter(0));

        assert_eq!(policy.next_delay(), policy.next_delay());
        assert_eq!(policy.attempt_count(), 0);
    }

    #[test]
    fn policy_max_delay_cap() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(2000),
            multiplier: 4.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        };

        assert_eq!(config.base_delay(0), Duration::from_millis(1000));
        assert_eq!(config.base_delay(1), Duration::from_millis(2000));
        assert_eq!(config.base_delay(50), Duration::from_millis(2000));
        assert_eq!(config.base_delay(u32::MAX), Duration::from_millis(2000));
    }

    #[test]
    fn policy_max_attempts() {
        let mut policy = ReconnectPolicy::new(no_jitter(3));

        for expected in 1..=3 {
            assert!(policy.next_delay().is_some());
            policy.record_attempt();
            assert_eq!(policy.attempt_count(), expected);
        }

        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());
    }

    #[test]
    fn policy_reset() {
        let mut policy = ReconnectPolicy::new(no_jitter(3));
        policy.record_attempt();
        policy.record_attempt();

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert!(policy.should_retry());
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn policy_jitter_bounds() {
        let policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(1000),
            ..ReconnectConfig::default()
        });

        for _ in 0..100 {
            let millis = policy.next_delay().unwrap().as_millis();

            assert!(millis >= 1000, "delay {millis}ms is below base 1000ms");
            assert!(millis <= 1200, "delay {millis}ms is above maximum 1200ms");
        }
    }

    #[test_case(f64::NAN ; "nan")]
    #[test_case(f64::INFINITY ; "infinite")]
    #[test_case(f64::NEG_INFINITY ; "negative infinite")]
    #[test_case(-0.5 ; "negative")]
    fn unusable_jitter_is_ignored(jitter_factor: f64) {
        let policy = ReconnectPolicy::new(ReconnectConfig {
            jitter_factor,
            ..no_jitter(0)
        });

        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test_case(f64::NAN ; "nan")]
    #[test_case(f64::INFINITY ; "infinite")]
    #[test_case(0.5 ; "shrinking")]
    fn unusable_multiplier_stays_within_bounds(multiplier: f64) {
        let config = ReconnectConfig {
            multiplier,
            ..no_jitter(0)
        };

        for attempt in [0, 1, 10, u32::MAX] {
            let delay = config.base_delay(attempt);
            assert!(delay >= Duration::from_millis(100), "{attempt}: {delay:?}");
            assert!(delay <= Duration::from_secs(10), "{attempt}: {delay:?}");
        }
    }

    #[test]
    fn unlimited_attempts() {
        let mut policy = ReconnectPolicy::new(no_jitter(0));

        for _ in 0..1000 {
            assert!(policy.should_retry());
            assert!(policy.next_delay().is_some());
            policy.record_attempt();
        }
    }

    proptest! {
        #[test]
        fn backoff_is_monotone_and_capped(
            initial_ms in 1u64..5_000,
            max_ms in 1u64..120_000,
            multiplier in 1.0f64..4.0,
            attempts in 1u32..40,
        ) {
            let config = ReconnectConfig {
                initial_delay: Duration::from_millis(initial_ms),
                max_delay: Duration::from_millis(max_ms),
                multiplier,
                jitter_factor: 0.2,
                max_attempts: 0,
            };
            let mut policy = ReconnectPolicy::new(config);
            let ceiling = Duration::from_millis(max_ms * 12 / 10 + 1);
            let mut previous = Duration::ZERO;

            for attempt in 0..attempts {
                let base = config.base_delay(attempt);
                prop_assert!(base >= previous);
                prop_assert!(base <= config.max_delay);
                previous = base;

                let delay = policy.next_delay().unwrap();
                prop_assert!(delay >= base);
                prop_assert!(delay <= ceiling);
                policy.record_attempt();
            }
        }
    }
}
