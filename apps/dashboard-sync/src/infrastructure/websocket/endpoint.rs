//! Endpoint validation.
//!
//! The dashboard socket only speaks `ws://` and `wss://`; anything else is
//! refused before a transport is ever opened.

use url::Url;

use crate::domain::error::{AppError, ErrorCode};

/// Message for an endpoint that does not parse as a URL.
pub const INVALID_URL: &str = "Invalid WebSocket URL";

/// Message for a URL whose scheme is not `ws` or `wss`.
pub const INVALID_PROTOCOL: &str = "Invalid WebSocket protocol";

/// Parse and check a WebSocket endpoint.
///
/// # Errors
///
/// Returns a `WS_INVALID_URL` WebSocket error when the text is not a URL or
/// the scheme is not `ws`/`wss`.
pub fn validate_endpoint(endpoint: &str) -> Result<Url, AppError> {
    let url = Url::parse(endpoint.trim()).map_err(|e| {
        AppError::websocket(INVALID_URL)
            .with_code(ErrorCode::WsInvalidUrl)
            .with_source(e)
    })?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        _ => Err(AppError::websocket(INVALID_PROTOCOL).with_code(ErrorCode::WsInvalidUrl)),
    }
}
