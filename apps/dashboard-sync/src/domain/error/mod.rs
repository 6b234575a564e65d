//! Application Error Taxonomy
//!
//! Every failure surfaced to dashboard consumers is an [`AppError`]: a message,
//! a machine-readable [`ErrorCode`], the time it was raised, an optional chained
//! cause, and an [`ErrorKind`] describing where it came from.
//!
//! # Kinds
//!
//! - `App`: generic application failure (`APP_ERROR`)
//! - `Network`: HTTP-style failures, optionally carrying a [`ResponseInfo`]
//! - `Validation`: malformed or untyped payloads
//! - `WebSocket`: transport failures, optionally carrying an [`EventInfo`]

use std::error::Error as StdError;
use std::fmt;

use chrono::{DateTime, Utc};

/// Boxed error used as the chained cause of an [`AppError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// WebSocket close code for a normal, intentional closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// WebSocket close code reported when a connection drops without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

// =============================================================================
// Error Codes
// =============================================================================

/// Machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Generic application error.
    App,
    /// Network (HTTP) failure.
    Network,
    /// Payload failed schema validation.
    Validation,
    /// Generic WebSocket transport failure.
    WebSocket,
    /// Inbound frame was not valid JSON.
    WsParse,
    /// `send` called with no transport.
    WsNotConnected,
    /// `send` called while the transport is closing or closed.
    WsNotOpen,
    /// Outbound queue is full while connecting.
    WsSendQueueFull,
    /// Reconnect attempts exhausted.
    WsReconnectExhausted,
    /// Endpoint URL is malformed or uses a non-WebSocket scheme.
    WsInvalidUrl,
}

impl ErrorCode {
    /// Wire representation of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::App => "APP_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::WebSocket => "WEBSOCKET_ERROR",
            Self::WsParse => "WS_PARSE_ERROR",
            Self::WsNotConnected => "WS_NOT_CONNECTED",
            Self::WsNotOpen => "WS_NOT_OPEN",
            Self::WsSendQueueFull => "WS_SEND_QUEUE_FULL",
            Self::WsReconnectExhausted => "WS_RECONNECT_EXHAUSTED",
            Self::WsInvalidUrl => "WS_INVALID_URL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Error Kinds
// =============================================================================

/// HTTP response descriptor attached to network errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseInfo {
    /// HTTP status code.
    pub status: u16,
    /// HTTP status text.
    pub status_text: String,
}

/// Transport event descriptor attached to WebSocket errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventInfo {
    /// Transport reported an error.
    Error {
        /// Description from the transport.
        description: String,
    },
    /// Transport closed.
    Close {
        /// Close code.
        code: u16,
        /// Close reason, empty when the peer sent none.
        reason: String,
    },
}

/// Where an error originated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Generic application failure.
    App,
    /// Network failure, optionally with the offending response.
    Network {
        /// HTTP response, if one was received.
        response: Option<ResponseInfo>,
    },
    /// Schema validation failure.
    Validation,
    /// WebSocket transport failure, optionally with the originating event.
    WebSocket {
        /// Transport event, if any.
        event: Option<EventInfo>,
    },
}

impl ErrorKind {
    /// Short name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::App => "AppError",
            Self::Network { .. } => "NetworkError",
            Self::Validation => "ValidationError",
            Self::WebSocket { .. } => "WebSocketError",
        }
    }
}

// =============================================================================
// AppError
// =============================================================================

/// Error surfaced to dashboard consumers.
#[derive(Debug)]
pub struct AppError {
    message: String,
    code: ErrorCode,
    kind: ErrorKind,
    timestamp: DateTime<Utc>,
    source: Option<BoxError>,
}

impl AppError {
    /// Create an error with an explicit kind and code.
    #[must_use]
    pub fn new(kind: ErrorKind, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            kind,
            timestamp: Utc::now(),
            source: None,
        }
    }

    /// Generic application error (`APP_ERROR`).
    #[must_use]
    pub fn app(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::App, ErrorCode::App, message)
    }

    /// Network error (`NETWORK_ERROR`).
    #[must_use]
    pub fn network(message: impl Into<String>, response: Option<ResponseInfo>) -> Self {
        Self::new(ErrorKind::Network { response }, ErrorCode::Network, message)
    }

    /// Validation error (`VALIDATION_ERROR`).
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, ErrorCode::Validation, message)
    }

    /// WebSocket error (`WEBSOCKET_ERROR`).
    #[must_use]
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::WebSocket { event: None },
            ErrorCode::WebSocket,
            message,
        )
    }

    /// WebSocket error describing a transport close.
    #[must_use]
    pub fn from_close(code: u16, reason: &str) -> Self {
        let text = if reason.is_empty() {
            close_reason(code)
        } else {
            reason.to_string()
        };
        Self::websocket(format!("connection closed: {text}")).with_event(EventInfo::Close {
            code,
            reason: reason.to_string(),
        })
    }

    /// Network error for a failed HTTP response.
    ///
    /// A message supplied by the server body wins; otherwise well-known
    /// statuses map to user-facing text.
    #[must_use]
    pub fn from_http_status(status: u16, status_text: &str, body_message: Option<&str>) -> Self {
        let message = match body_message {
            Some(msg) if !msg.is_empty() => msg.to_string(),
            _ => match status {
                401 => "Session expired. Please sign in again.".to_string(),
                403 => "You do not have permission to access this resource.".to_string(),
                404 => "Resource not found.".to_string(),
                500.. => "Server error. Please try again later.".to_string(),
                _ => format!("Error {status}: {status_text}"),
            },
        };

        Self::network(
            message,
            Some(ResponseInfo {
                status,
                status_text: status_text.to_string(),
            }),
        )
    }

    /// Replace the error code, keeping the kind.
    #[must_use]
    pub const fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = code;
        self
    }

    /// Chain an originating cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach a transport event to a WebSocket error.
    ///
    /// Has no effect on other kinds.
    #[must_use]
    pub fn with_event(mut self, info: EventInfo) -> Self {
        if let ErrorKind::WebSocket { event } = &mut self.kind {
            *event = Some(info);
        }
        self
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Error kind.
    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// When the error was raised.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self.kind, ErrorKind::Validation)
    }

    /// Whether this is a WebSocket error.
    #[must_use]
    pub const fn is_websocket(&self) -> bool {
        matches!(self.kind, ErrorKind::WebSocket { .. })
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for AppError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

// =============================================================================
// Reporting
// =============================================================================

/// Log an error with its code, kind, timestamp and cause, and count it.
pub fn report_error(error: &AppError, context: Option<&str>) {
    crate::infrastructure::metrics::record_error(error.code().as_str());
    let cause = error.source().map(ToString::to_string);
    tracing::error!(
        code = %error.code(),
        kind = error.kind().name(),
        timestamp = %error.timestamp().to_rfc3339(),
        cause = cause.as_deref().unwrap_or(""),
        context = context.unwrap_or(""),
        "{}",
        error.message()
    );
}

/// Human-readable reason for a WebSocket close code.
#[must_use]
pub fn close_reason(code: u16) -> String {
    let reason = match code {
        1000 => "Normal closure",
        1001 => "Going away",
        1002 => "Protocol error",
        1003 => "Unsupported data",
        1005 => "No status received",
        1006 => "Abnormal closure (connection lost)",
        1007 => "Invalid frame payload data",
        1008 => "Policy violation",
        1009 => "Message too big",
        1011 => "Internal server error",
        1012 => "Service restart",
        1013 => "Try again later",
        _ => return format!("Unknown close code: {code}"),
    };
    reason.to_string()
}
