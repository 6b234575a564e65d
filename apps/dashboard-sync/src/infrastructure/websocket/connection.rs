//! Connection Manager
//!
//! Owns the lifecycle of the dashboard socket: connect, send, manual
//! disconnect, and automatic reconnection with backoff.
//!
//! # Event model
//!
//! The manager never awaits. Transports and timers push [`SyncEvent`]s into a
//! queue; the owner drains that queue and calls [`ConnectionManager::handle_event`]
//! for each one. Everything the manager has to say comes out as
//! [`ConnectionEvent`]s on an unbounded channel, in the order it happened.
//!
//! # Staleness
//!
//! Every transport gets a fresh [`ConnectionId`] and every reconnect timer a
//! fresh [`TimerId`]. Events carrying an id that is no longer live are
//! dropped, so a close from a replaced socket or a timer that fires after
//! `disconnect()` can never reopen anything.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use url::Url;

use super::codec::decode_text;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::state::{CloseKind, ConnectionState};
use crate::application::ports::{
    ConnectionId, Connector, ReadyState, Scheduler, SyncEvent, TimerId, Transport, TransportEvent,
};
use crate::domain::error::{AppError, ErrorCode, EventInfo, NORMAL_CLOSURE, close_reason};
use crate::domain::snapshot::InboundMessage;
use crate::infrastructure::metrics;

/// Default capacity of the outbound queue used while connecting.
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 64;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Validated WebSocket endpoint.
    pub url: Url,
    /// Reconnection behavior.
    pub reconnect: ReconnectConfig,
    /// Frames buffered while the handshake is in flight.
    pub send_queue_capacity: usize,
}

impl ConnectionConfig {
    /// Configuration with default reconnect policy and queue size.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            reconnect: ReconnectConfig::default(),
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
        }
    }

    /// Replace the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Replace the outbound queue capacity.
    #[must_use]
    pub const fn with_send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity;
        self
    }
}

// =============================================================================
// Events
// =============================================================================

/// Output of the connection manager.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// State transition.
    StateChanged(ConnectionState),
    /// Handshake completed and queued frames were flushed.
    Opened,
    /// Validated inbound message.
    Message(InboundMessage),
    /// Transport closed.
    Closed {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Reconnect scheduled.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// Non-fatal error for the consumer.
    Error(AppError),
}

// =============================================================================
// Connection Manager
// =============================================================================

/// WebSocket lifecycle state machine.
pub struct ConnectionManager<C: Connector, S: Scheduler> {
    url: Url,
    connector: C,
    scheduler: S,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    transport: Option<C::Transport>,
    connection_id: ConnectionId,
    state: ConnectionState,
    policy: ReconnectPolicy,
    reconnect_timer: Option<TimerId>,
    next_timer_id: TimerId,
    manually_closed: bool,
    outbound: VecDeque<String>,
    queue_capacity: usize,
}

impl<C: Connector, S: Scheduler> std::fmt::Debug for ConnectionManager<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.url.as_str())
            .field("state", &self.state)
            .field("connection_id", &self.connection_id)
            .field("reconnect_attempts", &self.policy.attempt_count())
            .field("queued", &self.outbound.len())
            .finish_non_exhaustive()
    }
}

impl<C: Connector, S: Scheduler> ConnectionManager<C, S> {
    /// Create an idle manager and the receiver for its events.
    #[must_use]
    pub fn new(
        config: ConnectionConfig,
        connector: C,
        scheduler: S,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let manager = Self {
            url: config.url,
            connector,
            scheduler,
            events,
            transport: None,
            connection_id: 0,
            state: ConnectionState::Idle,
            policy: ReconnectPolicy::new(config.reconnect),
            reconnect_timer: None,
            next_timer_id: 0,
            manually_closed: false,
            outbound: VecDeque::with_capacity(config.send_queue_capacity),
            queue_capacity: config.send_queue_capacity,
        };
        (manager, rx)
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Open a transport unless one is already connecting or open.
    ///
    /// Clears a previous manual close and resets the reconnect policy, so this
    /// also resumes after exhaustion.
    pub fn connect(&mut self) {
        if self
            .transport
            .as_ref()
            .is_some_and(|t| matches!(t.ready_state(), ReadyState::Connecting | ReadyState::Open))
        {
            tracing::debug!(state = %self.state, "connect ignored, transport already active");
            return;
        }

        self.manually_closed = false;
        self.policy.reset();
        self.cancel_reconnect_timer();
        self.open_transport();
    }

    /// Serialize `message` as JSON and send it.
    ///
    /// # Errors
    ///
    /// `APP_ERROR` if serialization fails; otherwise see [`Self::send_text`].
    pub fn send<T: Serialize + ?Sized>(&mut self, message: &T) -> Result<(), AppError> {
        let text = serde_json::to_string(message)
            .map_err(|e| AppError::app("Failed to serialize outbound message").with_source(e))?;
        self.send_text(text)
    }

    /// Send a text frame, buffering it while the handshake is in flight.
    ///
    /// # Errors
    ///
    /// - `WS_NOT_CONNECTED` when there is no transport
    /// - `WS_NOT_OPEN` when the transport is closing or closed
    /// - `WS_SEND_QUEUE_FULL` when the connecting buffer is full
    pub fn send_text(&mut self, text: String) -> Result<(), AppError> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(AppError::websocket("WebSocket is not connected")
                .with_code(ErrorCode::WsNotConnected));
        };

        match (self.state, transport.ready_state()) {
            (ConnectionState::Open, ReadyState::Open) => {
                transport.send_text(text).map_err(|e| {
                    AppError::websocket("Failed to send WebSocket message")
                        .with_code(ErrorCode::WsNotOpen)
                        .with_source(e)
                })?;
                metrics::record_message_sent();
                Ok(())
            }
            // Open but not yet acknowledged still queues so frames keep their order.
            (_, ReadyState::Connecting | ReadyState::Open) => {
                if self.outbound.len() >= self.queue_capacity {
                    return Err(AppError::websocket(format!(
                        "Outbound queue is full ({} messages)",
                        self.queue_capacity
                    ))
                    .with_code(ErrorCode::WsSendQueueFull));
                }
                self.outbound.push_back(text);
                metrics::record_message_queued();
                tracing::debug!(queued = self.outbound.len(), "Message queued until open");
                Ok(())
            }
            (_, ReadyState::Closing | ReadyState::Closed) => {
                Err(AppError::websocket("WebSocket is not open").with_code(ErrorCode::WsNotOpen))
            }
        }
    }

    /// Close the connection and suppress reconnection.
    ///
    /// The pending reconnect timer is cancelled before the transport closes.
    pub fn disconnect(&mut self) {
        self.manually_closed = true;
        self.cancel_reconnect_timer();
        self.outbound.clear();

        if let Some(mut transport) = self.transport.take() {
            transport.close(NORMAL_CLOSURE, "Client disconnect");
            // Anything the old transport still reports is now stale.
            self.connection_id += 1;
            metrics::set_connected(false);
            self.emit(ConnectionEvent::Closed {
                code: NORMAL_CLOSURE,
                reason: "Client disconnect".to_string(),
            });
            tracing::info!(url = %self.url, "Disconnected");
        }

        self.set_state(ConnectionState::Closed(CloseKind::Manual));
    }

    /// Apply one queued event.
    pub fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Timer(id) => self.on_timer(id),
            SyncEvent::Transport { connection, event } => {
                if connection != self.connection_id || self.transport.is_none() {
                    tracing::trace!(connection, live = self.connection_id, "Stale transport event");
                    return;
                }
                match event {
                    TransportEvent::Open => self.on_open(),
                    TransportEvent::Text(text) => self.on_text(&text),
                    TransportEvent::Error(description) => self.on_transport_error(description),
                    TransportEvent::Close { code, reason } => self.on_close(code, reason),
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Whether the socket is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.state.is_open()
    }

    /// Whether a handshake is in flight.
    #[must_use]
    pub const fn is_connecting(&self) -> bool {
        matches!(self.state, ConnectionState::Connecting)
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts since the last successful open.
    #[must_use]
    pub const fn reconnect_attempts(&self) -> u32 {
        self.policy.attempt_count()
    }

    /// Id of the live transport.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Endpoint this manager connects to.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    fn open_transport(&mut self) {
        self.connection_id += 1;
        // Replaced transports are dropped without a close handshake.
        self.transport = None;

        match self.connector.open(&self.url, self.connection_id) {
            Ok(transport) => {
                tracing::info!(url = %self.url, connection = self.connection_id, "Connecting");
                self.transport = Some(transport);
                self.set_state(ConnectionState::Connecting);
            }
            Err(e) => {
                self.outbound.clear();
                self.emit_error(
                    AppError::websocket(format!("Failed to create WebSocket connection: {e}"))
                        .with_source(e),
                );
                self.set_state(ConnectionState::Closed(CloseKind::Failed));
            }
        }
    }

    fn on_timer(&mut self, id: TimerId) {
        if self.reconnect_timer != Some(id) {
            tracing::trace!(timer = id, "Ignoring stale reconnect timer");
            return;
        }
        self.reconnect_timer = None;

        if self.manually_closed {
            return;
        }
        tracing::info!(attempt = self.policy.attempt_count(), "Reconnect timer fired");
        self.open_transport();
    }

    fn on_open(&mut self) {
        self.policy.reset();

        let mut flush_error = None;
        if let Some(transport) = self.transport.as_mut() {
            let queued = self.outbound.len();
            while let Some(text) = self.outbound.pop_front() {
                if let Err(e) = transport.send_text(text) {
                    self.outbound.clear();
                    flush_error =
                        Some(AppError::websocket("Failed to flush queued message").with_source(e));
                    break;
                }
                metrics::record_message_sent();
            }
            if queued > 0 {
                tracing::debug!(queued, "Flushed queued messages");
            }
        }
        if let Some(error) = flush_error {
            self.emit_error(error);
        }

        metrics::set_connected(true);
        self.set_state(ConnectionState::Open);
        self.emit(ConnectionEvent::Opened);
        tracing::info!(url = %self.url, "WebSocket connected");
    }

    fn on_text(&mut self, text: &str) {
        match decode_text(text) {
            Ok(message) => {
                metrics::record_message_received(message.kind());
                tracing::debug!(kind = message.kind(), "Message received");
                self.emit(ConnectionEvent::Message(message));
            }
            Err(error) => {
                if error.code() == ErrorCode::WsParse {
                    metrics::record_parse_error();
                } else {
                    metrics::record_validation_error();
                }
                self.emit_error(error);
            }
        }
    }

    fn on_transport_error(&mut self, description: String) {
        tracing::warn!(error = %description, "WebSocket transport error");
        let host = self.url.host_str().unwrap_or("server");
        self.emit_error(
            AppError::websocket(format!("WebSocket connection error: {host} may not be available"))
                .with_event(EventInfo::Error { description }),
        );
    }

    fn on_close(&mut self, code: u16, reason: String) {
        self.transport = None;
        self.outbound.clear();
        metrics::set_connected(false);

        let described = if reason.is_empty() {
            close_reason(code)
        } else {
            reason.clone()
        };
        tracing::info!(code, reason = %described, "WebSocket closed");

        let abnormal = !self.manually_closed && code != NORMAL_CLOSURE;
        let close_error = abnormal.then(|| AppError::from_close(code, &reason));
        self.emit(ConnectionEvent::Closed { code, reason });

        if let Some(error) = close_error {
            self.emit_error(error);
            self.schedule_reconnect();
        } else if self.manually_closed {
            self.set_state(ConnectionState::Closed(CloseKind::Manual));
        } else {
            self.set_state(ConnectionState::Closed(CloseKind::Normal));
        }
    }

    fn schedule_reconnect(&mut self) {
        let Some(delay) = self.policy.next_delay() else {
            let attempts = self.policy.config().max_attempts;
            tracing::warn!(attempts, "Reconnect attempts exhausted");
            self.emit_error(
                AppError::websocket(format!("Failed to reconnect after {attempts} attempts"))
                    .with_code(ErrorCode::WsReconnectExhausted),
            );
            self.set_state(ConnectionState::Closed(CloseKind::Exhausted));
            return;
        };

        self.cancel_reconnect_timer();
        self.next_timer_id += 1;
        let id = self.next_timer_id;
        self.scheduler.schedule(id, delay);
        self.reconnect_timer = Some(id);

        let attempt = self.policy.attempt_count();
        metrics::record_reconnect();
        tracing::info!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnecting"
        );
        self.set_state(ConnectionState::Reconnecting);
        self.emit(ConnectionEvent::Reconnecting { attempt, delay });
    }

    fn cancel_reconnect_timer(&mut self) {
        if let Some(id) = self.reconnect_timer.take() {
            self.scheduler.cancel(id);
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "Connection state changed");
            self.state = state;
            self.emit(ConnectionEvent::StateChanged(state));
        }
    }

    fn emit_error(&self, error: AppError) {
        self.emit(ConnectionEvent::Error(error));
    }

    fn emit(&self, event: ConnectionEvent) {
        // Receiver gone means the feed is tearing down.
        let _ = self.events.send(event);
    }
}

// =============================================================================
// Tests
// =============================================================================
