//! tokio-tungstenite Transport
//!
//! Each transport is one spawned task that owns the socket. The manager talks
//! to it through an unbounded command channel; the task reports back through
//! the [`EventSink`]. The ready state is shared through an atomic so the
//! manager can read it without awaiting.
//!
//! Every task ends with exactly one [`TransportEvent::Close`], including when
//! the handshake fails (code 1006). Aborted tasks report nothing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use crate::application::ports::{
    ConnectionId, Connector, EventSink, ReadyState, Transport, TransportError, TransportEvent,
};
use crate::domain::error::{ABNORMAL_CLOSURE, NORMAL_CLOSURE};

/// Close code reported when the peer's close frame carried no status.
const NO_STATUS_RECEIVED: u16 = 1005;

#[derive(Debug)]
enum Command {
    Text(String),
    Close { code: u16, reason: String },
}

// =============================================================================
// Connector
// =============================================================================

/// Opens dashboard sockets with tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    events: EventSink,
    handle: Handle,
}

impl TungsteniteConnector {
    /// Create a connector spawning socket tasks on `handle`.
    #[must_use]
    pub const fn new(events: EventSink, handle: Handle) -> Self {
        Self { events, handle }
    }
}

impl Connector for TungsteniteConnector {
    type Transport = TungsteniteTransport;

    fn open(
        &mut self,
        url: &Url,
        connection: ConnectionId,
    ) -> Result<Self::Transport, TransportError> {
        let ready = Arc::new(AtomicU8::new(ReadyState::Connecting.as_u8()));
        let (commands, rx) = mpsc::unbounded_channel();

        let task = self.handle.spawn(run_socket(
            url.clone(),
            connection,
            self.events.clone(),
            Arc::clone(&ready),
            rx,
        ));

        Ok(TungsteniteTransport {
            ready,
            commands,
            task,
        })
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Handle to a socket task.
#[derive(Debug)]
pub struct TungsteniteTransport {
    ready: Arc<AtomicU8>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl TungsteniteTransport {
    fn store(&self, state: ReadyState) {
        self.ready.store(state.as_u8(), Ordering::Release);
    }
}

impl Transport for TungsteniteTransport {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready.load(Ordering::Acquire))
    }

    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.ready_state() != ReadyState::Open {
            return Err(TransportError::Closed);
        }
        self.commands
            .send(Command::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self, code: u16, reason: &str) {
        match self.ready_state() {
            ReadyState::Connecting => {
                self.task.abort();
                self.store(ReadyState::Closed);
            }
            ReadyState::Open => {
                self.store(ReadyState::Closing);
                let _ = self.commands.send(Command::Close {
                    code,
                    reason: reason.to_string(),
                });
            }
            ReadyState::Closing | ReadyState::Closed => {}
        }
    }
}

impl Drop for TungsteniteTransport {
    fn drop(&mut self) {
        // An open socket sees its command channel close and shuts down itself.
        if self.ready_state() == ReadyState::Connecting {
            self.task.abort();
        }
    }
}

// =============================================================================
// Socket Task
// =============================================================================

async fn run_socket(
    url: Url,
    connection: ConnectionId,
    events: EventSink,
    ready: Arc<AtomicU8>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let set = |state: ReadyState| ready.store(state.as_u8(), Ordering::Release);

    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "WebSocket handshake failed");
            set(ReadyState::Closed);
            events.transport(connection, TransportEvent::Error(e.to_string()));
            events.transport(
                connection,
                TransportEvent::Close {
                    code: ABNORMAL_CLOSURE,
                    reason: String::new(),
                },
            );
            return;
        }
    };

    set(ReadyState::Open);
    events.transport(connection, TransportEvent::Open);

    let (mut write, mut read) = stream.split();

    let (code, reason) = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        events.transport(connection, TransportEvent::Error(e.to_string()));
                        break (ABNORMAL_CLOSURE, String::new());
                    }
                }
                Some(Command::Close { code, reason }) => {
                    set(ReadyState::Closing);
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    if write.send(Message::Close(Some(frame))).await.is_err() {
                        break (code, String::new());
                    }
                }
                None => {
                    // Transport handle dropped without a close.
                    let _ = write.send(Message::Close(None)).await;
                    break (NORMAL_CLOSURE, String::new());
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    events.transport(connection, TransportEvent::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or((NO_STATUS_RECEIVED, String::new()), |f| {
                        (u16::from(f.code), f.reason.as_str().to_owned())
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    events.transport(connection, TransportEvent::Error(e.to_string()));
                    break (ABNORMAL_CLOSURE, String::new());
                }
                None => break (ABNORMAL_CLOSURE, String::new()),
            },
        }
    };

    set(ReadyState::Closed);
    tracing::debug!(connection, code, "Socket task finished");
    events.transport(connection, TransportEvent::Close { code, reason });
}
