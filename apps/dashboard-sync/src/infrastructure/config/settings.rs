//! Sync Configuration Settings
//!
//! Configuration for the dashboard sync client, loaded from environment
//! variables. Malformed numbers fall back to their defaults.

use std::time::Duration;

/// Default dashboard WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080";

/// Reconnection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectSettings {
    /// Delay before the first reconnect attempt.
    pub interval: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
    /// Backoff multiplier (1.0 = constant interval).
    pub multiplier: f64,
    /// Jitter fraction.
    pub jitter: f64,
    /// Attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            max_delay: Duration::from_secs(30),
            multiplier: 1.0,
            jitter: 0.0,
            max_attempts: 10,
        }
    }
}

/// Complete sync client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// WebSocket endpoint. Not validated here; the feed checks it on mount.
    pub ws_url: String,
    /// Reconnection settings.
    pub reconnect: ReconnectSettings,
    /// Frames buffered while connecting.
    pub send_queue_capacity: usize,
    /// Prometheus exporter port (0 = no HTTP listener).
    pub metrics_port: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            reconnect: ReconnectSettings::default(),
            send_queue_capacity: 64,
            metrics_port: 0,
        }
    }
}

impl SyncConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint variable is set but empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint variable is set but empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (ws_url, source) = match lookup("DASHBOARD_WS_URL") {
            Some(url) => (url, "DASHBOARD_WS_URL"),
            None => lookup("VITE_WS_URL").map_or_else(
                || (DEFAULT_WS_URL.to_string(), "DASHBOARD_WS_URL"),
                |url| (url, "VITE_WS_URL"),
            ),
        };

        if ws_url.trim().is_empty() {
            return Err(ConfigError::EmptyValue(source.to_string()));
        }

        let defaults = Self::default();
        let reconnect = ReconnectSettings {
            interval: parse_duration_millis(
                &lookup,
                "DASHBOARD_RECONNECT_INTERVAL_MS",
                defaults.reconnect.interval,
            ),
            max_delay: parse_duration_secs(
                &lookup,
                "DASHBOARD_RECONNECT_MAX_DELAY_SECS",
                defaults.reconnect.max_delay,
            ),
            multiplier: parse_or(
                &lookup,
                "DASHBOARD_RECONNECT_MULTIPLIER",
                defaults.reconnect.multiplier,
            ),
            jitter: parse_or(
                &lookup,
                "DASHBOARD_RECONNECT_JITTER",
                defaults.reconnect.jitter,
            ),
            max_attempts: parse_or(
                &lookup,
                "DASHBOARD_MAX_RECONNECT_ATTEMPTS",
                defaults.reconnect.max_attempts,
            ),
        };

        Ok(Self {
            ws_url,
            reconnect,
            send_queue_capacity: parse_or(
                &lookup,
                "DASHBOARD_SEND_QUEUE_CAPACITY",
                defaults.send_queue_capacity,
            ),
            metrics_port: parse_or(&lookup, "DASHBOARD_METRICS_PORT", defaults.metrics_port),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.ws_url, "ws://localhost:8080");
        assert_eq!(config.reconnect.interval, Duration::from_secs(5));
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.send_queue_capacity, 64);
    }

    #[test]
    fn vite_url_is_a_fallback() {
        let config = SyncConfig::from_lookup(lookup(&[("VITE_WS_URL", "ws://legacy:1")])).unwrap();
        assert_eq!(config.ws_url, "ws://legacy:1");

        let config = SyncConfig::from_lookup(lookup(&[
            ("VITE_WS_URL", "ws://legacy:1"),
            ("DASHBOARD_WS_URL", "wss://primary:2"),
        ]))
        .unwrap();
        assert_eq!(config.ws_url, "wss://primary:2");
    }

    #[test]
    fn empty_url_is_rejected() {
        let err = SyncConfig::from_lookup(lookup(&[("DASHBOARD_WS_URL", "  ")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "environment variable DASHBOARD_WS_URL cannot be empty"
        );
    }

    #[test]
    fn numeric_overrides_and_fallbacks() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("DASHBOARD_RECONNECT_INTERVAL_MS", "250"),
            ("DASHBOARD_RECONNECT_MULTIPLIER", "2.0"),
            ("DASHBOARD_MAX_RECONNECT_ATTEMPTS", "0"),
            ("DASHBOARD_SEND_QUEUE_CAPACITY", "lots"),
            ("DASHBOARD_METRICS_PORT", "9464"),
        ]))
        .unwrap();

        assert_eq!(config.reconnect.interval, Duration::from_millis(250));
        assert!((config.reconnect.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.reconnect.max_attempts, 0);
        assert_eq!(config.send_queue_capacity, 64);
        assert_eq!(config.metrics_port, 9464);
    }
}
