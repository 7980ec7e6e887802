//! Subscription registry: topic keys to ordered handler collections

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::messages::TopicKey;
use crate::models::UpdateEvent;

/// Callback invoked with each update delivered on a subscribed topic
pub type Handler = Arc<dyn Fn(&UpdateEvent) + Send + Sync>;

/// Opaque token identifying one registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

struct TopicEntry {
    key: TopicKey,
    handlers: Vec<(HandlerId, Handler)>,
}

/// Registry of live subscriptions
///
/// Entries are kept in insertion order; an entry exists only while at least
/// one handler remains registered for its topic. The registry itself lives
/// as long as the channel.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Vec<TopicEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a topic, creating the entry on first use
    pub fn insert(&mut self, key: TopicKey, id: HandlerId, handler: Handler) {
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.handlers.push((id, handler)),
            None => self.entries.push(TopicEntry {
                key,
                handlers: vec![(id, handler)],
            }),
        }
    }

    /// Remove one handler from a topic
    ///
    /// Returns `true` if this removal emptied the topic (the entry is then
    /// dropped from the registry).
    pub fn remove_handler(&mut self, key: &TopicKey, id: HandlerId) -> bool {
        let Some(index) = self.entries.iter().position(|e| &e.key == key) else {
            return false;
        };

        let entry = &mut self.entries[index];
        entry.handlers.retain(|(handler_id, _)| *handler_id != id);

        if entry.handlers.is_empty() {
            self.entries.remove(index);
            true
        } else {
            false
        }
    }

    /// Remove a topic and all of its handlers
    ///
    /// Returns `true` if the topic was present.
    pub fn remove_topic(&mut self, key: &TopicKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.key != key);
        self.entries.len() != before
    }

    /// All live topic keys, in insertion order
    pub fn topics(&self) -> Vec<TopicKey> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }

    /// Number of handlers registered for a topic
    pub fn handler_count(&self, key: &TopicKey) -> usize {
        self.entries
            .iter()
            .find(|e| &e.key == key)
            .map(|e| e.handlers.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fan an update out to every handler registered for its topic
    ///
    /// A panicking handler is isolated and logged; its siblings still run.
    /// Returns the number of handlers that completed.
    pub fn dispatch(&self, key: &TopicKey, event: &UpdateEvent) -> usize {
        let Some(entry) = self.entries.iter().find(|e| &e.key == key) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, handler) in &entry.handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::error!(topic = %key, handler = ?id, "Subscription handler panicked");
                }
            }
        }

        delivered
    }
}
