//! Registration table: event identity -> ordered listener entries.
//!
//! The table is the only shared mutable state of the bus. It is guarded by a
//! `RwLock`, and each identity's entry list lives behind an `Arc` that is
//! replaced copy-on-write, so a dispatcher can hold a snapshot while other
//! threads (or the listeners themselves) register and unregister.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use arbus_core::{CallbackResult, Event, EventListener, EventTypeId, ListenerId, ScopeId};

use crate::config::UnregisterPolicy;

/// Type-erased `notify`: `None` when the payload is not the listener's event type.
type ErasedNotify = dyn Fn(&dyn Any) -> Option<CallbackResult> + Send + Sync;

/// Immutable, ordered view of the entries registered for one identity.
pub type Snapshot = Arc<Vec<Registration>>;

/// One registration entry: an identity paired with one listener.
#[derive(Clone)]
pub struct Registration {
    id: ListenerId,
    identity: EventTypeId,
    scope: Option<ScopeId>,
    once: bool,
    listener_addr: usize,
    event_type_name: &'static str,
    notify: Arc<ErasedNotify>,
}

impl Registration {
    pub fn new<E: Event>(identity: EventTypeId, listener: Arc<dyn EventListener<E>>) -> Self {
        let listener_addr = listener_addr(&listener);
        let notify: Arc<ErasedNotify> = Arc::new(move |payload: &dyn Any| {
            payload.downcast_ref::<E>().map(|event| listener.notify(event))
        });

        Self {
            id: ListenerId::new(),
            identity,
            scope: None,
            once: false,
            listener_addr,
            event_type_name: std::any::type_name::<E>(),
            notify,
        }
    }

    /// Mark the entry as one-shot: it leaves the table with the first dispatch that reaches it.
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn in_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn identity(&self) -> &EventTypeId {
        &self.identity
    }

    pub fn scope(&self) -> Option<ScopeId> {
        self.scope
    }

    pub fn is_once(&self) -> bool {
        self.once
    }

    /// Rust type of the event this entry's listener was declared for.
    pub fn event_type_name(&self) -> &'static str {
        self.event_type_name
    }

    /// Whether this entry holds exactly `listener` (same allocation).
    pub fn holds<L: ?Sized>(&self, listener: &Arc<L>) -> bool {
        self.listener_addr == listener_addr(listener)
    }

    pub(crate) fn notify(&self, payload: &dyn Any) -> Option<CallbackResult> {
        (self.notify)(payload)
    }
}

impl core::fmt::Debug for Registration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("scope", &self.scope)
            .field("once", &self.once)
            .field("event_type", &self.event_type_name)
            .finish()
    }
}

fn listener_addr<L: ?Sized>(listener: &Arc<L>) -> usize {
    Arc::as_ptr(listener).cast::<()>() as usize
}

/// Mapping from event identity to the ordered entries awaiting that event.
#[derive(Debug, Default)]
pub struct RegistrationTable {
    entries: RwLock<HashMap<EventTypeId, Snapshot>>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    // Listeners never run under this lock, so poisoning can only come from a
    // panic inside the table itself; the map is still consistent then.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<EventTypeId, Snapshot>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<EventTypeId, Snapshot>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry after all existing entries for its identity.
    pub fn insert(&self, registration: Registration) -> ListenerId {
        let id = registration.id;
        let mut entries = self.write();
        let list = entries.entry(registration.identity.clone()).or_default();
        Arc::make_mut(list).push(registration);
        id
    }

    /// Remove entries for `identity` that hold `listener`.
    ///
    /// Returns the number of removed entries (0 when absent).
    pub fn remove_listener<L: ?Sized>(
        &self,
        identity: &EventTypeId,
        listener: &Arc<L>,
        policy: UnregisterPolicy,
    ) -> usize {
        let mut entries = self.write();
        let Some(list) = entries.get_mut(identity) else {
            return 0;
        };

        let removed = match policy {
            UnregisterPolicy::FirstMatch => {
                let position = list.iter().position(|r| r.holds(listener));
                match position {
                    Some(index) => {
                        Arc::make_mut(list).remove(index);
                        1
                    }
                    None => 0,
                }
            }
            UnregisterPolicy::AllMatches => {
                if list.iter().any(|r| r.holds(listener)) {
                    let before = list.len();
                    Arc::make_mut(list).retain(|r| !r.holds(listener));
                    before - list.len()
                } else {
                    0
                }
            }
        };

        if list.is_empty() {
            entries.remove(identity);
        }
        removed
    }

    /// Remove the entry with the given id, wherever it is registered.
    pub fn remove_id(&self, id: ListenerId) -> bool {
        self.remove_matching(|r| r.id == id) > 0
    }

    /// Remove every entry owned by `scope`.
    pub fn remove_scope(&self, scope: ScopeId) -> usize {
        self.remove_matching(|r| r.scope == Some(scope))
    }

    fn remove_matching(&self, predicate: impl Fn(&Registration) -> bool) -> usize {
        let mut entries = self.write();
        let mut removed = 0;
        entries.retain(|_, list| {
            if list.iter().any(&predicate) {
                let before = list.len();
                Arc::make_mut(list).retain(|r| !predicate(r));
                removed += before - list.len();
            }
            !list.is_empty()
        });
        removed
    }

    /// Snapshot of the entries for `identity`, in registration order.
    ///
    /// Empty when nothing is registered. The snapshot is immutable and does not
    /// observe later registrations or removals.
    pub fn listeners_for(&self, identity: &EventTypeId) -> Snapshot {
        self.read().get(identity).cloned().unwrap_or_default()
    }

    /// Remove the one-shot entry `id` from `identity` for the pass that reached it.
    ///
    /// Returns `false` when the entry is already gone (claimed by a concurrent
    /// pass, or unregistered since the snapshot was taken).
    pub(crate) fn claim(&self, identity: &EventTypeId, id: ListenerId) -> bool {
        let mut entries = self.write();
        let Some(list) = entries.get_mut(identity) else {
            return false;
        };
        let position = list.iter().position(|r| r.id == id);
        let Some(index) = position else {
            return false;
        };
        Arc::make_mut(list).remove(index);
        if list.is_empty() {
            entries.remove(identity);
        }
        true
    }

    pub fn count_for(&self, identity: &EventTypeId) -> usize {
        self.read().get(identity).map_or(0, |list| list.len())
    }

    /// Identities that currently have at least one entry.
    pub fn identities(&self) -> Vec<EventTypeId> {
        self.read().keys().cloned().collect()
    }

    /// Total number of entries across all identities.
    pub fn len(&self) -> usize {
        self.read().values().map(|list| list.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every entry (and with it the table's references to the listeners).
    pub fn clear(&self) {
        self.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping;
    impl arbus_core::Event for Ping {}

    fn noop() -> Arc<dyn EventListener<Ping>> {
        Arc::new(|_: &Ping| -> CallbackResult { Ok(()) })
    }

    fn ping() -> EventTypeId {
        EventTypeId::of::<Ping>()
    }

    #[test]
    fn insert_preserves_order_and_allows_duplicates() {
        let table = RegistrationTable::new();
        let a = noop();
        let first = table.insert(Registration::new(ping(), Arc::clone(&a)));
        let second = table.insert(Registration::new(ping(), Arc::clone(&a)));

        let snapshot = table.listeners_for(&ping());
        let ids: Vec<_> = snapshot.iter().map(Registration::id).collect();
        assert_eq!(ids, vec![first, second]);
        assert!(snapshot.iter().all(|r| r.holds(&a)));
    }

    #[test]
    fn unknown_identity_yields_empty_snapshot() {
        let table = RegistrationTable::new();
        assert!(table.listeners_for(&EventTypeId::named("ACT_RESULT_2")).is_empty());
        assert_eq!(table.count_for(&ping()), 0);
    }

    #[test]
    fn snapshot_is_not_affected_by_later_mutation() {
        let table = RegistrationTable::new();
        let a = noop();
        table.insert(Registration::new(ping(), Arc::clone(&a)));
        let snapshot = table.listeners_for(&ping());

        table.insert(Registration::new(ping(), noop()));
        table.remove_listener(&ping(), &a, UnregisterPolicy::AllMatches);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(table.count_for(&ping()), 1);
    }

    #[test]
    fn first_match_removes_one_entry() {
        let table = RegistrationTable::new();
        let a = noop();
        table.insert(Registration::new(ping(), Arc::clone(&a)));
        table.insert(Registration::new(ping(), Arc::clone(&a)));

        assert_eq!(table.remove_listener(&ping(), &a, UnregisterPolicy::FirstMatch), 1);
        assert_eq!(table.count_for(&ping()), 1);
    }

    #[test]
    fn all_matches_removes_every_entry_and_empty_identities() {
        let table = RegistrationTable::new();
        let a = noop();
        table.insert(Registration::new(ping(), Arc::clone(&a)));
        table.insert(Registration::new(ping(), Arc::clone(&a)));

        assert_eq!(table.remove_listener(&ping(), &a, UnregisterPolicy::AllMatches), 2);
        assert!(table.is_empty());
        assert!(table.identities().is_empty());
    }

    #[test]
    fn removing_absent_listener_is_a_noop() {
        let table = RegistrationTable::new();
        table.insert(Registration::new(ping(), noop()));
        let stranger = noop();

        assert_eq!(table.remove_listener(&ping(), &stranger, UnregisterPolicy::AllMatches), 0);
        assert_eq!(table.remove_listener(&EventTypeId::named("other"), &stranger, UnregisterPolicy::FirstMatch), 0);
        assert!(!table.remove_id(ListenerId::new()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn scope_removal_only_touches_owned_entries() {
        let table = RegistrationTable::new();
        let scope = ScopeId::new();
        table.insert(Registration::new(ping(), noop()).in_scope(scope));
        table.insert(Registration::new(EventTypeId::named("ACT_RESULT_1"), noop()).in_scope(scope));
        let kept = table.insert(Registration::new(ping(), noop()));

        assert_eq!(table.remove_scope(scope), 2);
        let remaining: Vec<_> = table.listeners_for(&ping()).iter().map(Registration::id).collect();
        assert_eq!(remaining, vec![kept]);
        assert_eq!(table.identities(), vec![ping()]);
    }

    #[test]
    fn one_shot_entry_is_claimed_once() {
        let table = RegistrationTable::new();
        let once = table.insert(Registration::new(ping(), noop()).once());
        let persistent = table.insert(Registration::new(ping(), noop()));

        assert!(table.claim(&ping(), once));
        assert!(!table.claim(&ping(), once));
        let after: Vec<_> = table.listeners_for(&ping()).iter().map(Registration::id).collect();
        assert_eq!(after, vec![persistent]);
        assert!(!table.claim(&EventTypeId::named("ACT_RESULT_2"), persistent));
    }

    #[test]
    fn erased_notify_rejects_foreign_payloads() {
        let registration = Registration::new(ping(), noop());
        assert!(registration.notify(&Ping).is_some());
        assert!(registration.notify(&42_u32).is_none());
        assert!(registration.event_type_name().ends_with("Ping"));
    }
}
