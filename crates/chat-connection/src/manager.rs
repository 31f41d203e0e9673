//! Connection manager owning the single chat session.
//!
//! Every state transition happens inside a `&mut self` method: either a
//! caller-initiated operation or [`ConnectionManager::next_event`], which
//! drains transport events and reconnect expiries from one channel.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::config::{ChatConfig, ConfigError, Endpoint};
use crate::credentials::CredentialSource;
use crate::dispatcher::{Dispatcher, Routed};
use crate::reconnection::ReconnectScheduler;
use crate::registry::SubscriptionRegistry;
use crate::transport::{
    ConnectRequest, EventSink, LoopEvent, Transport, TransportEvent, TransportHandle,
};
use crate::types::{ConnectError, ConnectionEvent, ConnectionStatus, SubscriptionHandle};

type Hook = Box<dyn FnMut() + Send>;
type ErrorHook = Box<dyn FnMut(&ConnectError) + Send>;

#[derive(Default)]
struct Hooks {
    on_connect: Option<Hook>,
    on_disconnect: Option<Hook>,
    on_error: Option<ErrorHook>,
}

/// Manages one authenticated connection to the chat endpoint.
pub struct ConnectionManager {
    endpoint: Endpoint,
    credentials: Arc<dyn CredentialSource>,
    transport: Arc<dyn Transport>,
    handle: Option<Box<dyn TransportHandle>>,
    /// Bumped on every activation and every discard of the handle.
    generation: u64,
    status: ConnectionStatus,
    status_tx: watch::Sender<ConnectionStatus>,
    registry: SubscriptionRegistry,
    dispatcher: Dispatcher,
    scheduler: ReconnectScheduler,
    hooks: Hooks,
    pending: VecDeque<ConnectionEvent>,
    loop_tx: mpsc::UnboundedSender<LoopEvent>,
    loop_rx: mpsc::UnboundedReceiver<LoopEvent>,
}

impl ConnectionManager {
    /// Creates a manager in the `Disconnected` state. Nothing is contacted
    /// until [`connect`](Self::connect).
    pub fn new(
        endpoint: Endpoint,
        credentials: Arc<dyn CredentialSource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (loop_tx, loop_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);

        Self {
            endpoint,
            credentials,
            transport,
            handle: None,
            generation: 0,
            status: ConnectionStatus::Disconnected,
            status_tx,
            registry: SubscriptionRegistry::new(),
            dispatcher: Dispatcher::default(),
            scheduler: ReconnectScheduler::new(chatlink_protocol::constants::RECONNECT_DELAY),
            hooks: Hooks::default(),
            pending: VecDeque::new(),
            loop_tx,
            loop_rx,
        }
    }

    /// Creates a manager from configuration (endpoint and reconnect delay).
    pub fn from_config(
        config: &ChatConfig,
        credentials: Arc<dyn CredentialSource>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let endpoint = config.endpoint()?;
        Ok(Self::new(endpoint, credentials, transport).with_reconnect_delay(config.reconnect_delay()))
    }

    /// Overrides the fixed reconnect delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.scheduler.set_delay(delay);
        self
    }

    pub fn set_on_connect(&mut self, hook: impl FnMut() + Send + 'static) {
        self.hooks.on_connect = Some(Box::new(hook));
    }

    pub fn set_on_disconnect(&mut self, hook: impl FnMut() + Send + 'static) {
        self.hooks.on_disconnect = Some(Box::new(hook));
    }

    pub fn set_on_error(&mut self, hook: impl FnMut(&ConnectError) + Send + 'static) {
        self.hooks.on_error = Some(Box::new(hook));
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Active subscription destinations, sorted.
    pub fn subscriptions(&self) -> Vec<String> {
        self.registry.destinations()
    }

    pub fn is_subscribed(&self, destination: &str) -> bool {
        self.registry.contains(destination)
    }

    /// Whether a reconnect attempt is pending.
    pub fn reconnect_pending(&self) -> bool {
        self.scheduler.is_armed()
    }

    /// Starts connecting. Returns immediately; the handshake outcome arrives
    /// through [`next_event`](Self::next_event).
    ///
    /// Fails only with [`ConnectError::MissingCredential`]. A live or
    /// negotiating session makes this a no-op.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        let Some(token) = self.credentials.token() else {
            warn!("no session token, not connecting");
            self.set_status(ConnectionStatus::Error);
            self.report_error(ConnectError::MissingCredential);
            return Err(ConnectError::MissingCredential);
        };

        if let Some(handle) = &self.handle {
            if handle.is_connected() {
                debug!("already connected");
                return Ok(());
            }
            if self.status == ConnectionStatus::Connecting {
                debug!("handshake already in progress");
                return Ok(());
            }
            self.discard_handle();
        }

        self.scheduler.cancel();
        self.set_status(ConnectionStatus::Connecting);

        self.generation = self.generation.wrapping_add(1);
        let request = ConnectRequest {
            url: self.endpoint.url_with_token(&token).to_string(),
            host: self.endpoint.host(),
            token,
        };
        let sink = EventSink::new(self.generation, self.loop_tx.clone());

        info!(endpoint = %self.endpoint.as_url(), "connecting");
        match self.transport.activate(&request, sink) {
            Ok(handle) => self.handle = Some(handle),
            Err(e) => {
                warn!(error = %e, "transport activation failed");
                self.set_status(ConnectionStatus::Error);
                self.report_error(ConnectError::TransportLevelError(e.to_string()));
                self.arm_reconnect();
            }
        }
        Ok(())
    }

    /// Tears the session down: cancels any pending reconnect, deactivates
    /// the transport, clears subscriptions. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        self.scheduler.cancel();
        let had_handle = self.discard_handle();
        self.registry.clear();
        self.dispatcher.clear();

        let was = self.status;
        self.set_status(ConnectionStatus::Disconnected);
        if had_handle || was != ConnectionStatus::Disconnected {
            info!("disconnected");
            if let Some(hook) = self.hooks.on_disconnect.as_mut() {
                hook();
            }
        }
    }

    /// Publishes `body` as JSON to `destination`.
    ///
    /// Returns `false`, without transmitting, unless a handle exists, the
    /// transport reports itself connected and status is `Connected`.
    /// Serialization and transmit failures also yield `false`.
    pub fn send_message<T: Serialize + ?Sized>(
        &self,
        destination: &str,
        body: &T,
        headers: &[(String, String)],
    ) -> bool {
        let Some(handle) = self.handle.as_ref() else {
            debug!(destination = %destination, reason = %ConnectError::PublishPrecondition, "send skipped: no transport");
            return false;
        };
        if !handle.is_connected() || self.status != ConnectionStatus::Connected {
            debug!(destination = %destination, status = %self.status, reason = %ConnectError::PublishPrecondition, "send skipped");
            return false;
        }

        let body = match serde_json::to_string(body) {
            Ok(b) => b,
            Err(e) => {
                warn!(destination = %destination, error = %e, "failed to serialize message body");
                return false;
            }
        };

        match handle.publish(destination, &body, headers) {
            Ok(()) => {
                trace!(destination = %destination, bytes = body.len(), "published");
                true
            }
            Err(e) => {
                warn!(destination = %destination, error = %e, "publish failed");
                false
            }
        }
    }

    /// Subscribes `callback` to `destination`. Every inbound body is
    /// decoded as JSON (raw text on failure) before reaching the callback.
    ///
    /// Returns `None` unless connected, or if the transport refuses.
    /// Subscribing again to the same destination replaces the callback.
    pub fn subscribe(
        &mut self,
        destination: &str,
        callback: impl FnMut(Routed) + Send + 'static,
    ) -> Option<SubscriptionHandle> {
        if self.status != ConnectionStatus::Connected {
            debug!(destination = %destination, reason = %ConnectError::SubscribePrecondition, "subscribe skipped");
            return None;
        }
        let handle = self.handle.as_ref()?;

        let id = match handle.subscribe(destination) {
            Ok(id) => id,
            Err(e) => {
                warn!(destination = %destination, error = %e, "subscribe failed");
                return None;
            }
        };

        if let Some(previous) = self.registry.insert(destination, id.clone()) {
            self.dispatcher.remove(&previous);
            if let Err(e) = handle.unsubscribe(&previous) {
                debug!(subscription = %previous, error = %e, "failed to cancel replaced subscription");
            }
        }
        self.dispatcher
            .install(id.clone(), destination, Box::new(callback));

        info!(destination = %destination, subscription = %id, "subscribed");
        Some(SubscriptionHandle {
            destination: destination.to_string(),
            id,
        })
    }

    /// Drops the subscription for `destination`, both the bookkeeping entry
    /// and the transport-level subscription. Returns `false` if it was not
    /// subscribed.
    pub fn unsubscribe(&mut self, destination: &str) -> bool {
        let Some(id) = self.registry.remove(destination) else {
            return false;
        };
        self.dispatcher.remove(&id);
        if let Some(handle) = self.handle.as_ref()
            && let Err(e) = handle.unsubscribe(&id)
        {
            debug!(subscription = %id, error = %e, "transport unsubscribe failed");
        }
        debug!(destination = %destination, "unsubscribed");
        true
    }

    /// Waits for the next event, applying the state transition it implies.
    ///
    /// This is the manager's event loop; callers poll it continuously.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let event = self.loop_rx.recv().await?;
            self.handle_loop_event(event);
        }
    }

    /// Non-blocking variant of [`next_event`](Self::next_event).
    pub fn try_next_event(&mut self) -> Option<ConnectionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let event = self.loop_rx.try_recv().ok()?;
            self.handle_loop_event(event);
        }
    }

    fn handle_loop_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Transport { generation, event } => {
                if generation != self.generation || self.handle.is_none() {
                    trace!(generation, current = self.generation, "ignoring event from discarded transport");
                    return;
                }
                self.handle_transport_event(event);
            }
            LoopEvent::ReconnectDue { generation } => {
                if self.scheduler.fire(generation) {
                    info!("reconnect timer fired");
                    // A missing token is reported by connect itself.
                    let _ = self.connect();
                }
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                if self.status == ConnectionStatus::Connected {
                    trace!("duplicate connected notification");
                    return;
                }
                self.set_status(ConnectionStatus::Connected);
                info!("connected");
                if let Some(hook) = self.hooks.on_connect.as_mut() {
                    hook();
                }
            }
            TransportEvent::Disconnected => {
                info!("transport disconnected");
                self.drop_session();
                self.set_status(ConnectionStatus::Disconnected);
                if let Some(hook) = self.hooks.on_disconnect.as_mut() {
                    hook();
                }
                self.arm_reconnect();
            }
            TransportEvent::StompError(message) => {
                warn!(error = %message, "broker error");
                self.drop_session();
                self.set_status(ConnectionStatus::Error);
                self.report_error(ConnectError::TransportNegotiationFailure(message));
                self.arm_reconnect();
            }
            TransportEvent::WebSocketError(message) => {
                warn!(error = %message, "socket error");
                self.drop_session();
                self.set_status(ConnectionStatus::Error);
                self.report_error(ConnectError::TransportLevelError(message));
                self.arm_reconnect();
            }
            TransportEvent::Frame { subscription, body } => {
                if let Some(destination) = self.dispatcher.dispatch(&subscription, &body) {
                    self.pending
                        .push_back(ConnectionEvent::FrameDelivered { destination });
                }
            }
        }
    }

    /// Arms the reconnect timer if status is terminal, a credential exists
    /// and nothing is armed yet.
    fn arm_reconnect(&mut self) {
        if !self.status.is_terminal() {
            return;
        }
        if self.credentials.token().is_none() {
            debug!("no session token, not scheduling reconnect");
            return;
        }
        if self.scheduler.arm(&self.loop_tx) {
            self.pending.push_back(ConnectionEvent::ReconnectScheduled {
                delay: self.scheduler.delay(),
            });
        }
    }

    /// Discards the handle and the subscriptions that died with it.
    fn drop_session(&mut self) {
        self.discard_handle();
        self.registry.clear();
        self.dispatcher.clear();
    }

    /// Deactivates and drops the transport handle. Returns `true` if one
    /// existed.
    fn discard_handle(&mut self) -> bool {
        match self.handle.take() {
            Some(mut handle) => {
                handle.deactivate();
                self.generation = self.generation.wrapping_add(1);
                true
            }
            None => false,
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        debug!(from = %self.status, to = %status, "status changed");
        self.status = status;
        if status == ConnectionStatus::Connected {
            self.scheduler.cancel();
        }
        self.status_tx.send_replace(status);
        self.pending.push_back(ConnectionEvent::StatusChanged(status));
    }

    fn report_error(&mut self, error: ConnectError) {
        if let Some(hook) = self.hooks.on_error.as_mut() {
            hook(&error);
        }
        self.pending.push_back(ConnectionEvent::Error(error));
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.scheduler.cancel();
        self.discard_handle();
    }
}
