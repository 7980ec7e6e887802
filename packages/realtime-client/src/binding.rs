//! Scoped subscription bindings for UI consumers
//!
//! A [`SubscriptionGuard`] ties one handler registration to a value's
//! lifetime: dropping the guard unsubscribes the handler, so a component
//! that owns its guards can never leak subscriptions past teardown.
//! [`BindingSet`] groups the guards of one consumer scope and de-duplicates
//! repeated binds of the same topic.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::channel::{ConnectionState, RealtimeClient};
use crate::messages::{ResourceId, ResourceKind, TopicKey};
use crate::models::UpdateEvent;
use crate::registry::HandlerId;

/// RAII registration of one update handler
///
/// Created by [`RealtimeClient::bind`]; the handler stays registered for
/// exactly as long as the guard lives.
#[derive(Debug)]
pub struct SubscriptionGuard {
    client: RealtimeClient,
    resource: ResourceKind,
    id: ResourceId,
    handler_id: HandlerId,
}

impl SubscriptionGuard {
    pub fn resource(&self) -> ResourceKind {
        self.resource
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Unsubscribe now instead of waiting for scope exit
    pub fn unbind(self) {}
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.client
            .unsubscribe(self.resource, self.id.clone(), self.handler_id);
    }
}

impl RealtimeClient {
    /// Subscribe to a topic for the lifetime of the returned guard
    pub fn bind<F>(
        &self,
        resource: ResourceKind,
        id: impl Into<ResourceId>,
        handler: F,
    ) -> SubscriptionGuard
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        let id = id.into();
        let handler_id = self.subscribe(resource, id.clone(), handler);
        SubscriptionGuard {
            client: self.clone(),
            resource,
            id,
            handler_id,
        }
    }
}

/// The subscription bindings of one consumer scope
///
/// Repeated binds of the same `(resource, id)` topic are no-ops, and every
/// remaining binding is released when the set is dropped, mirroring a UI
/// component declaring interest for the duration of its mount.
pub struct BindingSet {
    client: RealtimeClient,
    active: DashMap<TopicKey, SubscriptionGuard>,
}

impl BindingSet {
    pub fn new(client: RealtimeClient) -> Self {
        Self {
            client,
            active: DashMap::new(),
        }
    }

    /// Bind a handler to a topic; returns `false` if this set already holds
    /// a binding for it
    pub fn bind<F>(&self, resource: ResourceKind, id: impl Into<ResourceId>, handler: F) -> bool
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        let key = TopicKey::new(resource, id);
        match self.active.entry(key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                let guard = self.client.bind(key.resource, key.id, handler);
                vacant.insert(guard);
                true
            }
        }
    }

    /// Release one topic binding; returns `false` if it was not held
    pub fn release(&self, resource: ResourceKind, id: impl Into<ResourceId>) -> bool {
        self.active.remove(&TopicKey::new(resource, id)).is_some()
    }

    /// Release every binding held by this set
    pub fn clear(&self) {
        self.active.clear();
    }

    /// Number of live bindings
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Current connection state of the underlying channel
    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    /// True iff the underlying channel is open
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }
}

impl std::fmt::Debug for BindingSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingSet")
            .field("bindings", &self.active.len())
            .finish()
    }
}
