//! Bookkeeping of active subscriptions, keyed by destination.

use std::collections::HashMap;

use crate::transport::SubscriptionId;

/// Set of subscribed destinations, each with the transport id that
/// cancels it. One entry per destination.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<String, SubscriptionId>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `destination`. Returns the id it replaced, if the
    /// destination was already subscribed.
    pub fn insert(&mut self, destination: &str, id: SubscriptionId) -> Option<SubscriptionId> {
        self.entries.insert(destination.to_string(), id)
    }

    pub fn remove(&mut self, destination: &str) -> Option<SubscriptionId> {
        self.entries.remove(destination)
    }

    pub fn contains(&self, destination: &str) -> bool {
        self.entries.contains_key(destination)
    }

    /// Active destinations, sorted.
    pub fn destinations(&self) -> Vec<String> {
        let mut list: Vec<String> = self.entries.keys().cloned().collect();
        list.sort();
        list
    }

    /// Empties the registry, returning the ids that were live.
    pub fn clear(&mut self) -> Vec<SubscriptionId> {
        self.entries.drain().map(|(_, id)| id).collect()
    }
}
