//! Dashboard Feed
//!
//! The consumer-facing handle over one dashboard socket. Mounting a feed
//! validates the endpoint, builds a [`ConnectionManager`] and spawns a single
//! event loop that owns every state transition:
//!
//! ```text
//! transport / timers ──SyncEvent──► ConnectionManager ──ConnectionEvent──► FeedCore
//!                                                                           │
//!                                            watch::Receiver<FeedView> ◄────┘
//! ```
//!
//! Consumers read the latest [`FeedView`] synchronously or subscribe to
//! changes. Unmounting (or dropping) the feed always disconnects.
//!
//! # Example
//!
//! ```ignore
//! use dashboard_sync::{DashboardFeed, FeedConfig, Filters};
//!
//! let feed = DashboardFeed::mount(FeedConfig::new("ws://localhost:8080"));
//! let mut views = feed.subscribe();
//! while views.changed().await.is_ok() {
//!     let filtered = feed.filtered(&Filters::none());
//! }
//! feed.unmount().await;
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::application::ports::{Connector, EventSink, Scheduler, SyncEvent};
use crate::domain::error::{AppError, ErrorCode, report_error};
use crate::domain::filters::{Filters, apply_filters};
use crate::domain::reconcile::Reconciler;
use crate::domain::snapshot::Snapshot;
use crate::infrastructure::config::SyncConfig;
use crate::infrastructure::websocket::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState,
    DEFAULT_SEND_QUEUE_CAPACITY, ReconnectConfig, TokioScheduler, TungsteniteConnector,
    validate_endpoint,
};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for mounting a [`DashboardFeed`].
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Raw endpoint; validated on mount.
    pub endpoint: String,
    /// Reconnection behavior.
    pub reconnect: ReconnectConfig,
    /// Frames buffered while connecting.
    pub send_queue_capacity: usize,
    /// Snapshot fetched elsewhere, shown until the first frame arrives.
    pub seed: Option<Snapshot>,
}

impl FeedConfig {
    /// Configuration with default reconnect policy.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            reconnect: ReconnectConfig::default(),
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            seed: None,
        }
    }

    /// Configuration from environment settings.
    #[must_use]
    pub fn from_sync_config(config: &SyncConfig) -> Self {
        Self {
            endpoint: config.ws_url.clone(),
            reconnect: ReconnectConfig::from_settings(&config.reconnect),
            send_queue_capacity: config.send_queue_capacity,
            seed: None,
        }
    }

    /// Seed the feed with an initial snapshot.
    #[must_use]
    pub fn with_seed(mut self, snapshot: Snapshot) -> Self {
        self.seed = Some(snapshot);
        self
    }

    /// Replace the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

// =============================================================================
// View
// =============================================================================

/// What a dashboard renders from.
#[derive(Debug, Clone, Default)]
pub struct FeedView {
    /// Current reconciled snapshot.
    pub snapshot: Option<Arc<Snapshot>>,
    /// Whether the socket is open.
    pub connected: bool,
    /// Connection lifecycle state.
    pub state: ConnectionState,
    /// Message of the most recent error; cleared when a socket opens.
    pub error: Option<String>,
    /// Reconnect attempt in progress, 0 when none.
    pub reconnect_attempt: u32,
}

/// Folds manager output into the published view.
struct FeedCore {
    reconciler: Reconciler,
    view: watch::Sender<FeedView>,
}

impl FeedCore {
    fn apply(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::StateChanged(state) => self.view.send_modify(|v| {
                v.state = state;
                v.connected = state.is_open();
            }),
            ConnectionEvent::Opened => self.view.send_modify(|v| {
                v.connected = true;
                v.error = None;
                v.reconnect_attempt = 0;
            }),
            ConnectionEvent::Message(message) => {
                let kind = message.kind();
                let snapshot = self.reconciler.apply(message);
                tracing::debug!(
                    kind,
                    points = snapshot.time_series.len(),
                    "Snapshot reconciled"
                );
                self.view.send_modify(|v| v.snapshot = Some(snapshot));
            }
            ConnectionEvent::Closed { code, reason } => {
                tracing::debug!(code, reason = %reason, "Feed socket closed");
                self.view.send_modify(|v| v.connected = false);
            }
            ConnectionEvent::Reconnecting { attempt, delay } => {
                tracing::debug!(attempt, delay_ms = delay.as_millis(), "Feed reconnecting");
                self.view.send_modify(|v| v.reconnect_attempt = attempt);
            }
            ConnectionEvent::Error(error) => {
                report_error(&error, Some("dashboard feed"));
                self.view
                    .send_modify(|v| v.error = Some(error.message().to_string()));
            }
        }
    }
}

// =============================================================================
// Feed
// =============================================================================

type SharedManager<C, S> = Arc<Mutex<ConnectionManager<C, S>>>;

/// A mounted dashboard data feed.
pub struct DashboardFeed<C: Connector = TungsteniteConnector, S: Scheduler = TokioScheduler> {
    id: Uuid,
    manager: Option<SharedManager<C, S>>,
    view: watch::Receiver<FeedView>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DashboardFeed {
    /// Mount a feed over tokio-tungstenite.
    ///
    /// Must be called inside a tokio runtime. An invalid endpoint or a missing
    /// runtime yields a feed that never connects and whose view carries the
    /// error.
    #[must_use]
    pub fn mount(config: FeedConfig) -> Self {
        Self::mount_with(config, TungsteniteConnector::new, TokioScheduler::new)
    }
}

impl<C, S> DashboardFeed<C, S>
where
    C: Connector + 'static,
    C::Transport: 'static,
    S: Scheduler + 'static,
{
    /// Mount a feed over a custom connector and scheduler.
    ///
    /// Both factories receive the sink the event loop drains and the runtime
    /// handle to spawn on.
    pub fn mount_with<FC, FS>(config: FeedConfig, make_connector: FC, make_scheduler: FS) -> Self
    where
        FC: FnOnce(EventSink, Handle) -> C,
        FS: FnOnce(EventSink, Handle) -> S,
    {
        let id = Uuid::new_v4();
        let reconciler = config
            .seed
            .map_or_else(Reconciler::new, Reconciler::seeded);

        let url = match validate_endpoint(&config.endpoint) {
            Ok(url) => url,
            Err(error) => return Self::detached(id, &reconciler, &error),
        };

        let Ok(handle) = Handle::try_current() else {
            let error = AppError::app("Dashboard feed must be mounted inside a tokio runtime");
            return Self::detached(id, &reconciler, &error);
        };

        let (sink, sync_rx) = EventSink::channel();
        let connector = make_connector(sink.clone(), handle.clone());
        let scheduler = make_scheduler(sink, handle.clone());

        let connection = ConnectionConfig::new(url.clone())
            .with_reconnect(config.reconnect)
            .with_send_queue_capacity(config.send_queue_capacity);
        let (manager, conn_rx) = ConnectionManager::new(connection, connector, scheduler);
        let manager = Arc::new(Mutex::new(manager));

        let (view_tx, view_rx) = watch::channel(FeedView {
            snapshot: reconciler.current(),
            ..FeedView::default()
        });
        let core = FeedCore {
            reconciler,
            view: view_tx,
        };

        let cancel = CancellationToken::new();
        let span = tracing::info_span!("dashboard_feed", feed_id = %id, url = %url);
        let task = handle.spawn(
            run_event_loop(
                Arc::clone(&manager),
                core,
                sync_rx,
                conn_rx,
                cancel.clone(),
            )
            .instrument(span),
        );

        tracing::info!(feed_id = %id, url = %url, "Dashboard feed mounted");
        manager.lock().connect();

        Self {
            id,
            manager: Some(manager),
            view: view_rx,
            cancel,
            task: Some(task),
        }
    }

    fn detached(id: Uuid, reconciler: &Reconciler, error: &AppError) -> Self {
        report_error(error, Some("mount"));
        let (_view_tx, view_rx) = watch::channel(FeedView {
            snapshot: reconciler.current(),
            error: Some(error.message().to_string()),
            ..FeedView::default()
        });
        Self {
            id,
            manager: None,
            view: view_rx,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Feed identifier used in logs.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current reconciled snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.view.borrow().snapshot.clone()
    }

    /// Whether the socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.view.borrow().connected
    }

    /// Message of the most recent error.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.view.borrow().error.clone()
    }

    /// Connection lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.view.borrow().state
    }

    /// Copy of the whole view.
    #[must_use]
    pub fn view(&self) -> FeedView {
        self.view.borrow().clone()
    }

    /// Receiver notified on every view change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FeedView> {
        self.view.clone()
    }

    /// Current snapshot with `filters` applied.
    #[must_use]
    pub fn filtered(&self, filters: &Filters) -> Option<Snapshot> {
        self.snapshot().map(|s| apply_filters(&s, filters))
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Serialize and send a message to the server.
    ///
    /// # Errors
    ///
    /// `WS_NOT_CONNECTED` when the feed never mounted a connection; otherwise
    /// whatever [`ConnectionManager::send`] returns.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), AppError> {
        self.manager
            .as_ref()
            .map_or_else(|| Err(not_connected()), |m| m.lock().send(message))
    }

    /// Send a raw text frame.
    ///
    /// # Errors
    ///
    /// Same as [`Self::send`].
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), AppError> {
        self.manager
            .as_ref()
            .map_or_else(|| Err(not_connected()), |m| m.lock().send_text(text.into()))
    }

    /// Reconnect after a manual disconnect or exhausted retries.
    pub fn connect(&self) {
        if let Some(manager) = &self.manager {
            manager.lock().connect();
        }
    }

    /// Close the socket without unmounting; [`Self::connect`] resumes.
    pub fn disconnect(&self) {
        if let Some(manager) = &self.manager {
            manager.lock().disconnect();
        }
    }

    /// Disconnect and wait for the event loop to finish.
    pub async fn unmount(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(feed_id = %self.id, error = %e, "Feed event loop ended abnormally");
        }
        tracing::info!(feed_id = %self.id, "Dashboard feed unmounted");
    }
}

impl<C: Connector, S: Scheduler> DashboardFeed<C, S> {
    /// Disconnect unconditionally and stop the event loop. Idempotent.
    fn shutdown(&mut self) {
        if let Some(manager) = self.manager.take() {
            manager.lock().disconnect();
        }
        self.cancel.cancel();
    }
}

impl<C: Connector, S: Scheduler> Drop for DashboardFeed<C, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<C: Connector, S: Scheduler> std::fmt::Debug for DashboardFeed<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardFeed")
            .field("id", &self.id)
            .field("view", &*self.view.borrow())
            .finish_non_exhaustive()
    }
}

fn not_connected() -> AppError {
    AppError::websocket("WebSocket is not connected").with_code(ErrorCode::WsNotConnected)
}

// =============================================================================
// Event Loop
// =============================================================================

async fn run_event_loop<C: Connector, S: Scheduler>(
    manager: SharedManager<C, S>,
    mut core: FeedCore,
    mut sync_rx: mpsc::UnboundedReceiver<SyncEvent>,
    mut conn_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("Feed event loop cancelled");
                break;
            }
            Some(event) = conn_rx.recv() => core.apply(event),
            Some(event) = sync_rx.recv() => {
                manager.lock().handle_event(event);
            }
            else => break,
        }
    }

    // Publish what the final disconnect emitted.
    while let Ok(event) = conn_rx.try_recv() {
        core.apply(event);
    }
}
