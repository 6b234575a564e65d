//! Connection state.

use std::fmt;

/// Why a connection ended up closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// `disconnect()` was called.
    Manual,
    /// Peer closed with code 1000.
    Normal,
    /// Reconnect attempts ran out.
    Exhausted,
    /// The transport could not be created at all.
    Failed,
}

impl CloseKind {
    /// Lowercase label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Normal => "normal",
            Self::Exhausted => "exhausted",
            Self::Failed => "failed",
        }
    }
}

/// Lifecycle state of the dashboard socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Idle,
    /// Transport created, handshake in flight.
    Connecting,
    /// Handshake done; frames flow.
    Open,
    /// Waiting for the reconnect timer.
    Reconnecting,
    /// Terminal until the next explicit `connect()`.
    Closed(CloseKind),
}

impl ConnectionState {
    /// Whether frames can be sent right now.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Open => f.write_str("open"),
            Self::Reconnecting => f.write_str("reconnecting"),
            Self::Closed(kind) => write!(f, "closed ({})", kind.as_str()),
        }
    }
}
