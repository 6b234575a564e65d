//! Dashboard Sync Binary
//!
//! Mounts a dashboard feed against the configured server and logs every
//! published view until shutdown.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin dashboard-sync
//! ```
//!
//! # Environment Variables
//!
//! - `DASHBOARD_WS_URL`: WebSocket endpoint (fallback `VITE_WS_URL`,
//!   default: `ws://localhost:8080`)
//! - `DASHBOARD_RECONNECT_INTERVAL_MS`: First reconnect delay (default: 5000)
//! - `DASHBOARD_RECONNECT_MAX_DELAY_SECS`: Delay ceiling (default: 30)
//! - `DASHBOARD_RECONNECT_MULTIPLIER`: Backoff multiplier (default: 1.0)
//! - `DASHBOARD_RECONNECT_JITTER`: Jitter fraction (default: 0.0)
//! - `DASHBOARD_MAX_RECONNECT_ATTEMPTS`: 0 = unlimited (default: 10)
//! - `DASHBOARD_SEND_QUEUE_CAPACITY`: Frames buffered while connecting (default: 64)
//! - `DASHBOARD_METRICS_PORT`: Prometheus port, 0 records without a listener (default: 0)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: dashboard-sync)
//! - `RUST_LOG`: Log level (default: info)

use dashboard_sync::infrastructure::telemetry;
use dashboard_sync::{DashboardFeed, FeedConfig, FeedView, SyncConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let telemetry_guard = telemetry::init();

    tracing::info!(
        otel_export = telemetry_guard.is_exporting(),
        "Starting Dashboard Sync"
    );

    let config = SyncConfig::from_env()?;
    log_config(&config);

    let _metrics_handle = init_metrics(config.metrics_port)?;

    let feed = DashboardFeed::mount(FeedConfig::from_sync_config(&config));
    log_view(&feed.view());

    let shutdown_token = CancellationToken::new();
    tokio::spawn(await_shutdown(shutdown_token.clone()));

    let mut views = feed.subscribe();
    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => break,
            changed = views.changed() => {
                if changed.is_err() {
                    tracing::warn!("Feed stopped publishing, exiting");
                    break;
                }
                log_view(&views.borrow_and_update());
            }
        }
    }

    feed.unmount().await;
    tracing::info!("Dashboard Sync stopped");
    Ok(())
}

fn log_view(view: &FeedView) {
    let (points, bars, cells) = view.snapshot.as_ref().map_or((0, 0, 0), |s| {
        (s.time_series.len(), s.bar_data.len(), s.heatmap_data.len())
    });
    tracing::info!(
        points,
        bars,
        cells,
        state = %view.state,
        connected = view.connected,
        reconnect_attempt = view.reconnect_attempt,
        error = view.error.as_deref().unwrap_or(""),
        "Dashboard view updated"
    );
}

fn log_config(config: &SyncConfig) {
    tracing::info!(
        ws_url = %config.ws_url,
        max_reconnect_attempts = config.reconnect.max_attempts,
        reconnect_interval_ms = u64::try_from(config.reconnect.interval.as_millis()).unwrap_or(u64::MAX),
        send_queue_capacity = config.send_queue_capacity,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
}

async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}

fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}
