//! Port Interfaces
//!
//! Contracts between the connection manager and the outside world, following
//! the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`Connector`]: opens a [`Transport`] to an endpoint
//! - [`Transport`]: an open socket handle owned by the manager
//! - [`Scheduler`]: one-shot timers for reconnect backoff
//!
//! ## Event Queue
//!
//! Adapters never call back into the manager. They push [`SyncEvent`]s into
//! an [`EventSink`]; a single loop drains the queue and applies each event in
//! order, so every state transition happens on one timeline.

use std::time::Duration;

use tokio::sync::mpsc;
use url::Url;

/// Identifies one transport instance; events from older instances are stale.
pub type ConnectionId = u64;

/// Identifies one scheduled timer.
pub type TimerId = u64;

// =============================================================================
// Events
// =============================================================================

/// Ready state of a transport, mirroring the browser WebSocket states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    /// Handshake in flight.
    Connecting = 0,
    /// Frames can be sent.
    Open = 1,
    /// Close handshake in flight.
    Closing = 2,
    /// Closed.
    Closed = 3,
}

impl ReadyState {
    /// Numeric representation for atomic storage.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`ReadyState::as_u8`]; unknown values read as closed.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Something a transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed.
    Open,
    /// Text frame received.
    Text(String),
    /// Transport-level error; a `Close` always follows.
    Error(String),
    /// Transport closed.
    Close {
        /// Close code (1006 when the connection dropped).
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// An event for the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Event from a transport.
    Transport {
        /// Transport that produced the event.
        connection: ConnectionId,
        /// The event.
        event: TransportEvent,
    },
    /// A scheduled timer fired.
    Timer(TimerId),
}

/// Producer side of the manager's event queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl EventSink {
    /// Create a sink and the receiver the event loop drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Push a transport event. Returns `false` once the loop is gone.
    pub fn transport(&self, connection: ConnectionId, event: TransportEvent) -> bool {
        self.tx
            .send(SyncEvent::Transport { connection, event })
            .is_ok()
    }

    /// Push a timer expiry. Returns `false` once the loop is gone.
    pub fn timer(&self, id: TimerId) -> bool {
        self.tx.send(SyncEvent::Timer(id)).is_ok()
    }
}

// =============================================================================
// Ports
// =============================================================================

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The transport has shut down.
    #[error("transport closed")]
    Closed,

    /// The connector refused to create a transport.
    #[error("connection rejected: {0}")]
    Rejected(String),
}

/// An open socket handle.
pub trait Transport: Send {
    /// Current ready state.
    fn ready_state(&self) -> ReadyState;

    /// Queue a text frame for transmission.
    ///
    /// # Errors
    ///
    /// Fails when the transport can no longer accept frames.
    fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Start the close handshake. Idempotent.
    fn close(&mut self, code: u16, reason: &str);
}

/// Opens transports.
pub trait Connector: Send {
    /// Transport produced by this connector.
    type Transport: Transport;

    /// Begin connecting to `url`. Events for the new transport are tagged with
    /// `connection`.
    ///
    /// # Errors
    ///
    /// Fails only when a transport cannot be created at all; handshake
    /// failures arrive later as events.
    fn open(&mut self, url: &Url, connection: ConnectionId)
    -> Result<Self::Transport, TransportError>;
}

/// One-shot timers that fire as [`SyncEvent::Timer`].
#[cfg_attr(test, mockall::automock)]
pub trait Scheduler: Send {
    /// Fire `id` after `delay`.
    fn schedule(&mut self, id: TimerId, delay: Duration);

    /// Cancel `id` if it has not fired. Unknown ids are ignored.
    fn cancel(&mut self, id: TimerId);
}
