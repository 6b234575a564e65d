//! Reconnection Policy
//!
//! Backoff schedule for re-opening the dashboard socket after an abnormal
//! close. The default is a constant 5 second interval with a ceiling of ten
//! attempts; [`ReconnectConfig::exponential`] doubles from one second up to a
//! 30 second cap and never gives up.
//!
//! The policy is plain state: it never sleeps. The connection manager asks it
//! for the next delay and hands that delay to a scheduler.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::ReconnectSettings;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub base_interval: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor per attempt (1.0 = constant interval).
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Attempts allowed before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(5000),
            max_delay: Duration::from_secs(30),
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Doubling backoff from 1s to 30s, unlimited attempts.
    #[must_use]
    pub const fn exponential() -> Self {
        Self {
            base_interval: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }

    /// Build from environment-derived settings.
    #[must_use]
    pub const fn from_settings(settings: &ReconnectSettings) -> Self {
        Self {
            base_interval: settings.interval,
            max_delay: settings.max_delay,
            multiplier: settings.multiplier,
            jitter_factor: settings.jitter,
            max_attempts: settings.max_attempts,
        }
    }

    /// Set the attempt ceiling.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base interval.
    #[must_use]
    pub const fn with_base_interval(mut self, base_interval: Duration) -> Self {
        self.base_interval = base_interval;
        self
    }
}

/// Mutable backoff state for one connection manager.
///
/// # Example
///
/// ```rust
/// use dashboard_sync::infrastructure::websocket::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::exponential());
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
///
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a policy with no attempts made.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Consume one attempt and return its delay.
    ///
    /// Returns `None` once the attempt ceiling is reached; the counter is not
    /// advanced in that case.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        let delay = self.delay_for(self.attempt_count);
        self.attempt_count += 1;
        Some(self.apply_jitter(delay))
    }

    /// Forget all attempts; called after every successful open.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts consumed since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Policy configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Un-jittered delay for a zero-based attempt index.
    fn delay_for(&self, attempt: u32) -> Duration {
        let cap = self.config.max_delay;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.config.multiplier.max(0.0).powi(exponent);
        let scaled = self.config.base_interval.as_secs_f64() * factor;

        if !scaled.is_finite() || scaled >= cap.as_secs_f64() {
            return cap;
        }
        Duration::from_secs_f64(scaled.max(0.0)).min(cap)
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let range = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-range..=range);
        let adjusted = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(adjusted as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig::default()
            .with_base_interval(Duration::from_millis(100))
            .with_max_attempts(max_attempts)
    }

    #[test]
    fn default_is_constant_five_seconds() {
        let config = ReconnectConfig::default();
        assert_eq!(config.base_interval, Duration::from_millis(5000));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!((config.multiplier - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 10);

        let mut policy = ReconnectPolicy::new(config);
        for _ in 0..10 {
            assert_eq!(policy.next_delay(), Some(Duration::from_secs(5)));
        }
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn exponential_doubles_to_cap() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::exponential());
        let delays: Vec<u64> = (0..7)
            .filter_map(|_| policy.next_delay())
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, [1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn max_attempts_stops_without_advancing() {
        let mut policy = ReconnectPolicy::new(constant(3));

        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert_eq!(policy.attempt_count(), 3);

        assert!(policy.next_delay().is_none());
        assert_eq!(policy.attempt_count(), 3);
        assert!(!policy.should_retry());
    }

    #[test]
    fn reset_restores_first_delay() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::exponential());
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 2);

        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                base_interval: Duration::from_millis(1000),
                jitter_factor: 0.1,
                ..ReconnectConfig::default()
            });

            let millis = policy.next_delay().unwrap().as_millis();
            assert!(millis >= 900, "delay {millis}ms is below minimum 900ms");
            assert!(millis <= 1100, "delay {millis}ms is above maximum 1100ms");
        }
    }

    #[test]
    fn zero_means_unlimited() {
        let mut policy = ReconnectPolicy::new(constant(0));
        for _ in 0..1000 {
            assert!(policy.should_retry());
            assert!(policy.next_delay().is_some());
        }
    }

    #[test]
    fn huge_attempt_counts_saturate_at_cap() {
        let policy = ReconnectPolicy::new(ReconnectConfig::exponential());
        assert_eq!(policy.delay_for(10_000), Duration::from_secs(30));
    }
}
