//! Configuration Module
//!
//! Environment-driven configuration for the sync client.

mod settings;

pub use settings::{ConfigError, DEFAULT_WS_URL, ReconnectSettings, SyncConfig};
