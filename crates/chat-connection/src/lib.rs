//! Connection layer for chatlink.
//!
//! Owns a single authenticated STOMP session: credential lookup, status
//! tracking, fixed-delay reconnection, subscription bookkeeping and
//! per-destination frame dispatch. The socket itself sits behind the
//! [`Transport`] trait; [`WsTransport`] is the WebSocket implementation.

pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod manager;
mod pumps;
pub(crate) mod reconnection;
pub mod registry;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod transport;
pub mod types;
pub mod ws_client;

pub use config::{ChatConfig, ConfigError, Endpoint, Environment};
pub use credentials::{CredentialSource, SessionStore, StoreError};
pub use dispatcher::Routed;
pub use manager::ConnectionManager;
pub use transport::{
    ConnectRequest, EventSink, SubscriptionId, Transport, TransportError, TransportEvent,
    TransportHandle,
};
pub use types::{ConnectError, ConnectionEvent, ConnectionStatus, SubscriptionHandle};
pub use ws_client::WsTransport;
