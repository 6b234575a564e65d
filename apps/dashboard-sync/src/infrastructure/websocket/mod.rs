//! Dashboard WebSocket Client
//!
//! Everything between the raw socket and the reconciler:
//!
//! - [`codec`]: frame parsing and schema validation
//! - [`endpoint`]: `ws://`/`wss://` URL checks
//! - [`connection`]: the connection state machine
//! - [`reconnect`]: backoff policy
//! - [`transport`] and [`scheduler`]: tokio adapters for the ports the
//!   connection manager is generic over

pub mod codec;
pub mod connection;
pub mod endpoint;
pub mod reconnect;
pub mod scheduler;
pub mod state;
pub mod transport;

pub use codec::{ValidationError, decode_message, decode_text};
pub use connection::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, DEFAULT_SEND_QUEUE_CAPACITY,
};
pub use endpoint::validate_endpoint;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use scheduler::TokioScheduler;
pub use state::{CloseKind, ConnectionState};
pub use transport::{TungsteniteConnector, TungsteniteTransport};
