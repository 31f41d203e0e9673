//! Transport seam between the connection manager and the socket.
//!
//! A [`Transport`] starts a session and hands back a [`TransportHandle`];
//! everything asynchronous (handshake result, disconnects, inbound frames)
//! comes back through the [`EventSink`] onto the manager's event loop.

use std::fmt;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

/// Errors from a transport implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("connection closed")]
    Closed,

    #[error("outbound queue full")]
    Backpressure,

    #[error("no async runtime available")]
    NoRuntime,

    #[error("transport rejected request: {0}")]
    Rejected(String),
}

/// Transport-assigned identifier of a live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a transport needs to open an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Full endpoint URL, token already in the query string.
    pub url: String,
    /// Value for the STOMP `host` header.
    pub host: String,
    pub token: String,
}

/// Events a transport reports back to the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// STOMP session negotiated.
    Connected,
    /// Socket closed, by either side.
    Disconnected,
    /// Broker sent an ERROR frame.
    StompError(String),
    /// Lower-level socket failure.
    WebSocketError(String),
    /// A MESSAGE frame for one of our subscriptions.
    Frame {
        subscription: SubscriptionId,
        body: String,
    },
}

/// Internal event-loop messages.
#[derive(Debug)]
pub(crate) enum LoopEvent {
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    ReconnectDue {
        generation: u64,
    },
}

/// Channel end given to a transport on activation.
///
/// Tagged with the activation generation so events from a handle the
/// manager has already discarded are ignored.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<LoopEvent>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<LoopEvent>) -> Self {
        Self { generation, tx }
    }

    /// Pushes an event onto the manager's loop. Returns `false` once the
    /// manager is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(LoopEvent::Transport {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Returns `true` once the owning manager has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Factory for transport sessions.
pub trait Transport: Send + Sync {
    /// Starts negotiating a session. Must return without waiting for the
    /// handshake; the outcome is reported through `events`.
    fn activate(
        &self,
        request: &ConnectRequest,
        events: EventSink,
    ) -> Result<Box<dyn TransportHandle>, TransportError>;
}

/// One live (or negotiating) transport session.
pub trait TransportHandle: Send {
    /// Whether the transport itself considers the session established.
    fn is_connected(&self) -> bool;

    fn publish(
        &self,
        destination: &str,
        body: &str,
        headers: &[(String, String)],
    ) -> Result<(), TransportError>;

    fn subscribe(&self, destination: &str) -> Result<SubscriptionId, TransportError>;

    fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), TransportError>;

    /// Closes the session. Must be idempotent.
    fn deactivate(&mut self);
}
