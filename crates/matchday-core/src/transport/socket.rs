//! The socket seam between the session state machine and the network.
//!
//! A [`Connector`] opens sockets; each open socket reports back through a
//! [`SocketEvents`] sink tagged with the generation it was opened under,
//! so events from a socket the session has already abandoned are ignored.

use std::sync::Weak;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

use super::session::SessionInner;
use crate::config::TransportConfig;

/// Opens sockets. Implementations must not block and must not call back
/// into the session synchronously from `open`.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: Url, events: SocketEvents) -> Box<dyn SocketHandle>;
}

/// Fire-and-forget control of one open (or opening) socket.
pub trait SocketHandle: Send {
    fn send(&self, text: String);
    fn close(&self);
}

/// Event sink for one socket.
#[derive(Clone)]
pub struct SocketEvents {
    generation: u64,
    session: Weak<SessionInner>,
}

impl SocketEvents {
    pub(crate) fn new(generation: u64, session: Weak<SessionInner>) -> Self {
        Self { generation, session }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn opened(&self) {
        if let Some(session) = self.session.upgrade() {
            session.handle_open(self.generation);
        }
    }

    pub fn message(&self, text: &str) {
        if let Some(session) = self.session.upgrade() {
            session.handle_message(self.generation, text);
        }
    }

    pub fn closed(&self, code: Option<u16>) {
        if let Some(session) = self.session.upgrade() {
            session.handle_close(self.generation, code);
        }
    }

    pub fn errored(&self) {
        if let Some(session) = self.session.upgrade() {
            session.handle_error(self.generation);
        }
    }
}

// ============================================================================
// tokio-tungstenite implementation
// ============================================================================

enum Outbound {
    Text(String),
    Close,
}

/// Connects over WebSocket, one spawned task per socket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    /// A handshake not completed within `connect_timeout` counts as a failed connect.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Gives up on a connect after the same silence that marks an open socket stale.
    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.stale_after())
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}

struct WsHandle {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SocketHandle for WsHandle {
    fn send(&self, text: String) {
        let _ = self.tx.send(Outbound::Text(text));
    }

    fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

impl Connector for WsConnector {
    fn open(&self, url: Url, events: SocketEvents) -> Box<dyn SocketHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(url, self.connect_timeout, rx, events));
        Box::new(WsHandle { tx })
    }
}

async fn run_socket(
    url: Url,
    connect_timeout: Duration,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    events: SocketEvents,
) {
    let generation = events.generation();
    debug!(generation, host = url.host_str().unwrap_or(""), "Opening socket");

    let ws = match tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((ws, _))) => ws,
        Ok(Err(e)) => {
            warn!(generation, error = %e, "Socket connect failed");
            events.errored();
            events.closed(None);
            return;
        }
        Err(_) => {
            warn!(generation, timeout_ms = connect_timeout.as_millis() as u64, "Socket connect timed out");
            events.errored();
            events.closed(None);
            return;
        }
    };

    events.opened();
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        warn!(generation, error = %e, "Socket send failed");
                        events.errored();
                        events.closed(None);
                        return;
                    }
                }
                // The session already moved on; its close path has run.
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    return;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => events.message(text.as_str()),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => events.message(text),
                    Err(_) => debug!(generation, "Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    events.closed(frame.map(|f| u16::from(f.code)));
                    return;
                }
                // Ping/pong control frames are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(generation, error = %e, "Socket read failed");
                    events.errored();
                    events.closed(None);
                    return;
                }
                None => {
                    events.closed(None);
                    return;
                }
            },
        }
    }
}
