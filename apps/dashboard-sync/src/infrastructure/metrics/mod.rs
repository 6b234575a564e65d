//! Prometheus Metrics Module
//!
//! Counters and gauges for the dashboard socket.
//!
//! # Metrics
//!
//! - `dashboard_sync_messages_received_total{kind}`: validated frames
//! - `dashboard_sync_parse_errors_total`: frames that were not JSON
//! - `dashboard_sync_validation_errors_total`: frames with the wrong shape
//! - `dashboard_sync_messages_sent_total` / `_queued_total`: outbound frames
//! - `dashboard_sync_reconnects_total`: scheduled reconnect attempts
//! - `dashboard_sync_errors_total{code}`: every reported `AppError`
//! - `dashboard_sync_connected`: 1 while the socket is open
//!
//! Recording is a no-op until [`init_metrics`] installs a recorder.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Counter bumped by every reported error.
pub const ERRORS_TOTAL: &str = "dashboard_sync_errors_total";

/// Metrics installation failure.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The exporter could not be built.
    #[error("failed to build Prometheus exporter: {0}")]
    Build(#[from] BuildError),
    /// Another recorder owns the global slot.
    #[error("a global metrics recorder is already installed")]
    AlreadyInstalled,
}

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder.
///
/// With `port == 0` the recorder is installed without an HTTP listener and
/// metrics are only reachable through the returned handle. Otherwise the
/// exporter serves `/metrics` on `0.0.0.0:port`. Calling this again returns
/// the existing handle.
///
/// # Errors
///
/// Returns an error if the recorder or listener cannot be installed.
pub fn init_metrics(port: u16) -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = if port == 0 {
        PrometheusBuilder::new().install_recorder()?
    } else {
        let builder =
            PrometheusBuilder::new().with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)));
        let (recorder, exporter) = builder.build()?;
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder).map_err(|_| MetricsError::AlreadyInstalled)?;
        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(error = ?e, "Prometheus exporter stopped");
            }
        });
        handle
    };

    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

fn register_metrics() {
    describe_counter!(
        "dashboard_sync_messages_received_total",
        "Validated frames received by message kind"
    );
    describe_counter!(
        "dashboard_sync_parse_errors_total",
        "Inbound frames that were not valid JSON"
    );
    describe_counter!(
        "dashboard_sync_validation_errors_total",
        "Inbound frames that failed schema validation"
    );
    describe_counter!(
        "dashboard_sync_messages_sent_total",
        "Frames written to the socket"
    );
    describe_counter!(
        "dashboard_sync_messages_queued_total",
        "Frames buffered while connecting"
    );
    describe_counter!(
        "dashboard_sync_reconnects_total",
        "Reconnect attempts scheduled"
    );
    describe_counter!(ERRORS_TOTAL, "Errors reported by code");
    describe_gauge!(
        "dashboard_sync_connected",
        "1 while the dashboard socket is open"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a validated inbound message.
pub fn record_message_received(kind: &'static str) {
    counter!("dashboard_sync_messages_received_total", "kind" => kind).increment(1);
}

/// Record a frame that was not JSON.
pub fn record_parse_error() {
    counter!("dashboard_sync_parse_errors_total").increment(1);
}

/// Record a frame that failed validation.
pub fn record_validation_error() {
    counter!("dashboard_sync_validation_errors_total").increment(1);
}

/// Record a frame written to the socket.
pub fn record_message_sent() {
    counter!("dashboard_sync_messages_sent_total").increment(1);
}

/// Record a frame buffered until open.
pub fn record_message_queued() {
    counter!("dashboard_sync_messages_queued_total").increment(1);
}

/// Record a scheduled reconnect attempt.
pub fn record_reconnect() {
    counter!("dashboard_sync_reconnects_total").increment(1);
}

/// Record a reported error.
pub fn record_error(code: &'static str) {
    counter!(ERRORS_TOTAL, "code" => code).increment(1);
}

/// Update the connected gauge.
pub fn set_connected(connected: bool) {
    gauge!("dashboard_sync_connected").set(if connected { 1.0 } else { 0.0 });
}
