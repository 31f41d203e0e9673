//! Routes inbound frame bodies to per-subscription callbacks.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::transport::SubscriptionId;

/// A frame body after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// Body parsed as JSON.
    Json(serde_json::Value),
    /// Body that failed to parse, passed through untouched.
    Raw(String),
}

/// Callback invoked for every frame on a subscription.
pub type FrameCallback = Box<dyn FnMut(Routed) + Send>;

/// Parses a frame body, falling back to the raw text on failure.
pub fn decode_body(destination: &str, body: &str) -> Routed {
    match serde_json::from_str(body) {
        Ok(value) => Routed::Json(value),
        Err(e) => {
            warn!(destination = %destination, error = %e, "failed to decode frame body, routing raw");
            Routed::Raw(body.to_string())
        }
    }
}

struct Route {
    destination: String,
    callback: FrameCallback,
}

/// One decode-and-route callback per live subscription.
#[derive(Default)]
pub(crate) struct Dispatcher {
    routes: HashMap<SubscriptionId, Route>,
}

impl Dispatcher {
    pub(crate) fn install(&mut self, id: SubscriptionId, destination: &str, callback: FrameCallback) {
        self.routes.insert(
            id,
            Route {
                destination: destination.to_string(),
                callback,
            },
        );
    }

    pub(crate) fn remove(&mut self, id: &SubscriptionId) -> bool {
        self.routes.remove(id).is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.routes.clear();
    }

    /// Decodes `body` and hands it to the callback of `id`. Returns the
    /// destination the frame was delivered to.
    pub(crate) fn dispatch(&mut self, id: &SubscriptionId, body: &str) -> Option<String> {
        let Some(route) = self.routes.get_mut(id) else {
            debug!(subscription = %id, "frame for unknown subscription, dropping");
            return None;
        };
        let routed = decode_body(&route.destination, body);
        (route.callback)(routed);
        Some(route.destination.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn collector() -> (Arc<Mutex<Vec<Routed>>>, FrameCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let cb: FrameCallback = Box::new(move |r| seen_cb.lock().unwrap().push(r));
        (seen, cb)
    }

    #[test]
    fn decode_json_body() {
        let routed = decode_body("/t", r#"{"type":"chat.message"}"#);
        assert_eq!(routed, Routed::Json(serde_json::json!({"type": "chat.message"})));
    }

    #[test]
    fn decode_malformed_body_passes_raw() {
        let routed = decode_body("/t", "not json {{{");
        assert_eq!(routed, Routed::Raw("not json {{{".into()));
    }

    #[test]
    fn dispatch_routes_to_matching_callback() {
        let mut d = Dispatcher::default();
        let (seen_a, cb_a) = collector();
        let (seen_b, cb_b) = collector();
        d.install("sub-0".into(), "/a", cb_a);
        d.install("sub-1".into(), "/b", cb_b);

        let dest = d.dispatch(&"sub-1".into(), "42");
        assert_eq!(dest.as_deref(), Some("/b"));
        assert!(seen_a.lock().unwrap().is_empty());
        assert_eq!(seen_b.lock().unwrap().as_slice(), &[Routed::Json(42.into())]);
    }

    #[test]
    fn malformed_frame_keeps_route_alive() {
        let mut d = Dispatcher::default();
        let (seen, cb) = collector();
        d.install("sub-0".into(), "/a", cb);

        d.dispatch(&"sub-0".into(), "garbage");
        d.dispatch(&"sub-0".into(), r#"{"ok":true}"#);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Routed::Raw("garbage".into()));
        assert_eq!(seen[1], Routed::Json(serde_json::json!({"ok": true})));
    }

    #[test]
    fn unknown_subscription_is_dropped() {
        let mut d = Dispatcher::default();
        assert!(d.dispatch(&"sub-9".into(), "{}").is_none());
    }

    #[test]
    fn install_replaces_and_remove_detaches() {
        let mut d = Dispatcher::default();
        let (first, cb1) = collector();
        let (second, cb2) = collector();
        d.install("sub-0".into(), "/a", cb1);
        d.install("sub-0".into(), "/a", cb2);
        d.dispatch(&"sub-0".into(), "1");
        assert!(first.lock().unwrap().is_empty());
        assert_eq!(second.lock().unwrap().len(), 1);

        assert!(d.remove(&"sub-0".into()));
        assert!(d.dispatch(&"sub-0".into(), "1").is_none());
    }
}
