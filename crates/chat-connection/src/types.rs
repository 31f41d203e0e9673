//! Public types for the connection manager.

use std::fmt;
use std::time::Duration;

use crate::transport::SubscriptionId;

/// Connection status. Gates every send and subscribe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// No transport handle, or the transport reported a disconnect.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// STOMP session negotiated.
    Connected,
    /// Last attempt failed (missing credential, broker or socket error).
    Error,
}

impl ConnectionStatus {
    /// Terminal states are the ones the reconnect scheduler reacts to.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionStatus::Disconnected | ConnectionStatus::Error)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Failure causes reported through [`ConnectionEvent::Error`] and the
/// `on_error` hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("no session token available")]
    MissingCredential,

    #[error("session negotiation failed: {0}")]
    TransportNegotiationFailure(String),

    #[error("transport error: {0}")]
    TransportLevelError(String),

    #[error("publish attempted while not connected")]
    PublishPrecondition,

    #[error("subscribe attempted while not connected")]
    SubscribePrecondition,

    #[error("failed to decode frame: {0}")]
    FrameDecodeFailure(String),
}

/// Events produced by [`ConnectionManager::next_event`](crate::ConnectionManager::next_event).
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The connection status changed.
    StatusChanged(ConnectionStatus),
    /// An attempt failed. Status has already moved to `Error` where relevant.
    Error(ConnectError),
    /// A reconnect attempt was armed.
    ReconnectScheduled { delay: Duration },
    /// A frame was routed to the callback of `destination`.
    FrameDelivered { destination: String },
}

/// Handle returned by a successful subscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub(crate) destination: String,
    pub(crate) id: SubscriptionId,
}

impl SubscriptionHandle {
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }
}
