#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Dashboard Sync - Real-time Dashboard Data Client
//!
//! Keeps one WebSocket connection to the dashboard data server alive,
//! validates every frame and reconciles `initial`/`update` messages into a
//! single snapshot that dashboard views read and filter.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure data and logic
//!   - `snapshot`: Time series, bar and heatmap types
//!   - `reconcile`: Replace-or-append merge of inbound messages
//!   - `filters`: Date range, metric and category filters
//!   - `error`: `AppError` taxonomy and reporting
//!
//! - **Application**: Ports and the consumer binding
//!   - `ports`: Transport, connector and scheduler traits
//!   - `feed`: `DashboardFeed`, mounted once per dashboard
//!
//! - **Infrastructure**: Adapters and ambient concerns
//!   - `websocket`: Codec, endpoint checks, connection manager, backoff
//!   - `config`: Environment configuration
//!   - `metrics`: Prometheus counters
//!   - `telemetry`: tracing and OpenTelemetry
//!
//! # Data Flow
//!
//! ```text
//! Dashboard server ──WS──► transport ──► ConnectionManager ──► codec ──► Reconciler
//!                                                                          │
//!                                     dashboard views ◄── filters ◄── FeedView
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Snapshot types, reconciliation, filters and errors.
pub mod domain;

/// Application layer - Ports and the dashboard feed.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::error::{AppError, ErrorCode, ErrorKind, report_error};
pub use domain::filters::{Filters, apply_filters};
pub use domain::reconcile::{Reconciler, reconcile};
pub use domain::snapshot::{
    BarEntry, BarValue, HeatmapCell, InboundMessage, PartialSnapshot, Snapshot, TimeSeriesPoint,
};

// Feed binding
pub use application::feed::{DashboardFeed, FeedConfig, FeedView};

// Infrastructure config
pub use infrastructure::config::{ConfigError, SyncConfig};

// Connection
pub use infrastructure::websocket::{ConnectionState, ReconnectConfig};

// Metrics
pub use infrastructure::metrics::{MetricsError, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
