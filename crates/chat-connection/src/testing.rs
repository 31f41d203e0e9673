//! In-memory transport for driving a [`ConnectionManager`](crate::ConnectionManager)
//! without a server.
//!
//! The test plays the broker: it completes handshakes, drops connections
//! and delivers frames, then drains the manager's event loop.

use std::sync::{Arc, Mutex, PoisonError};

use crate::transport::{
    ConnectRequest, EventSink, SubscriptionId, Transport, TransportError, TransportEvent,
    TransportHandle,
};

#[derive(Default)]
struct FakeState {
    requests: Vec<ConnectRequest>,
    sink: Option<EventSink>,
    connected: bool,
    deactivations: usize,
    next_sub: u64,
    active: Vec<(SubscriptionId, String)>,
    unsubscribed: Vec<SubscriptionId>,
    published: Vec<(String, String)>,
    fail_activate: bool,
    fail_publish: bool,
    fail_subscribe: bool,
}

/// Scriptable transport. Clones share state.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Number of times `activate` was called.
    pub fn activations(&self) -> usize {
        self.with(|s| s.requests.len())
    }

    pub fn last_request(&self) -> Option<ConnectRequest> {
        self.with(|s| s.requests.last().cloned())
    }

    pub fn deactivations(&self) -> usize {
        self.with(|s| s.deactivations)
    }

    /// Sink handed to the most recent activation.
    pub fn sink(&self) -> Option<EventSink> {
        self.with(|s| s.sink.clone())
    }

    /// Emits `event` on the most recent activation's sink.
    pub fn emit(&self, event: TransportEvent) {
        if let Some(sink) = self.sink() {
            sink.emit(event);
        }
    }

    /// Marks the session established and reports it.
    pub fn complete_handshake(&self) {
        self.with(|s| s.connected = true);
        self.emit(TransportEvent::Connected);
    }

    /// Simulates the server closing the socket.
    pub fn drop_connection(&self) {
        self.with(|s| {
            s.connected = false;
            s.active.clear();
        });
        self.emit(TransportEvent::Disconnected);
    }

    /// Overrides what the handle reports from `is_connected`.
    pub fn set_transport_connected(&self, connected: bool) {
        self.with(|s| s.connected = connected);
    }

    pub fn set_fail_activate(&self, fail: bool) {
        self.with(|s| s.fail_activate = fail);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.with(|s| s.fail_publish = fail);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.with(|s| s.fail_subscribe = fail);
    }

    /// Delivers `body` to the newest live subscription on `destination`.
    pub fn deliver(&self, destination: &str, body: &str) {
        let id = self.with(|s| {
            s.active
                .iter()
                .rev()
                .find(|(_, d)| d == destination)
                .map(|(id, _)| id.clone())
        });
        if let Some(id) = id {
            self.deliver_to(&id, body);
        }
    }

    /// Delivers `body` tagged with an explicit subscription id.
    pub fn deliver_to(&self, id: &SubscriptionId, body: &str) {
        self.emit(TransportEvent::Frame {
            subscription: id.clone(),
            body: body.to_string(),
        });
    }

    /// `(destination, body)` of every successful publish.
    pub fn published(&self) -> Vec<(String, String)> {
        self.with(|s| s.published.clone())
    }

    /// Live subscription destinations as the transport sees them.
    pub fn active_destinations(&self) -> Vec<String> {
        self.with(|s| s.active.iter().map(|(_, d)| d.clone()).collect())
    }

    pub fn unsubscribed(&self) -> Vec<SubscriptionId> {
        self.with(|s| s.unsubscribed.clone())
    }
}

impl Transport for FakeTransport {
    fn activate(
        &self,
        request: &ConnectRequest,
        events: EventSink,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        self.with(|s| {
            s.requests.push(request.clone());
            if s.fail_activate {
                return Err(TransportError::Rejected("activation refused".into()));
            }
            s.sink = Some(events);
            s.connected = false;
            Ok(())
        })?;
        Ok(Box::new(FakeHandle {
            transport: self.clone(),
            active: true,
        }))
    }
}

struct FakeHandle {
    transport: FakeTransport,
    active: bool,
}

impl TransportHandle for FakeHandle {
    fn is_connected(&self) -> bool {
        self.active && self.transport.with(|s| s.connected)
    }

    fn publish(
        &self,
        destination: &str,
        body: &str,
        _headers: &[(String, String)],
    ) -> Result<(), TransportError> {
        self.transport.with(|s| {
            if s.fail_publish {
                return Err(TransportError::Backpressure);
            }
            s.published.push((destination.to_string(), body.to_string()));
            Ok(())
        })
    }

    fn subscribe(&self, destination: &str) -> Result<SubscriptionId, TransportError> {
        self.transport.with(|s| {
            if s.fail_subscribe {
                return Err(TransportError::Closed);
            }
            let id = SubscriptionId::from(format!("sub-{}", s.next_sub));
            s.next_sub += 1;
            s.active.push((id.clone(), destination.to_string()));
            Ok(id)
        })
    }

    fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), TransportError> {
        self.transport.with(|s| {
            s.active.retain(|(active, _)| active != id);
            s.unsubscribed.push(id.clone());
            Ok(())
        })
    }

    fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.transport.with(|s| {
            s.deactivations += 1;
            s.connected = false;
            s.active.clear();
        });
    }
}
