//! Owner-scoped registrations.
//!
//! A result owner (a screen, a controller, a test) usually registers several
//! listeners and wants all of them gone when it goes away. A [`ListenerScope`]
//! tags its entries with a [`ScopeId`] and removes them together on
//! [`ListenerScope::close`] or drop.

use std::sync::Arc;

use arbus_core::{Event, EventListener, EventTypeId, ListenerId, ScopeId};

use crate::bus::EventBus;
use crate::table::Registration;

#[derive(Debug)]
pub struct ListenerScope {
    id: ScopeId,
    bus: EventBus,
    closed: bool,
}

impl ListenerScope {
    pub(crate) fn new(bus: EventBus) -> Self {
        Self {
            id: ScopeId::new(),
            bus,
            closed: false,
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn register<E: Event>(
        &self,
        identity: impl Into<EventTypeId>,
        listener: Arc<dyn EventListener<E>>,
    ) -> ListenerId {
        self.bus
            .insert(Registration::new(identity.into(), listener).in_scope(self.id))
    }

    pub fn register_once<E: Event>(
        &self,
        identity: impl Into<EventTypeId>,
        listener: Arc<dyn EventListener<E>>,
    ) -> ListenerId {
        self.bus
            .insert(Registration::new(identity.into(), listener).in_scope(self.id).once())
    }

    /// Register a listener under the identity of its event type.
    pub fn on<E, L>(&self, listener: L) -> ListenerId
    where
        E: Event,
        L: EventListener<E> + 'static,
    {
        self.register::<E>(EventTypeId::of::<E>(), Arc::new(listener))
    }

    /// Number of entries this scope still owns.
    pub fn len(&self) -> usize {
        self.bus
            .table()
            .identities()
            .iter()
            .map(|identity| {
                self.bus
                    .listeners_for(identity)
                    .iter()
                    .filter(|r| r.scope() == Some(self.id))
                    .count()
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry registered through this scope.
    pub fn close(mut self) -> usize {
        self.closed = true;
        self.bus.unregister_scope(self.id)
    }
}

impl Drop for ListenerScope {
    fn drop(&mut self) {
        if !self.closed {
            self.bus.unregister_scope(self.id);
        }
    }
}
