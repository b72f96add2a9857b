//! Activity result event bus (registration + synchronous dispatch).
//!
//! The bus is a lightweight **in-process notification primitive**:
//!
//! - **Synchronous**: `dispatch` invokes listeners on the calling thread and
//!   returns when the last one has run.
//! - **Ordered**: listeners for one identity run in registration order.
//! - **Snapshot-on-dispatch**: registrations and removals made while a pass is
//!   running (including by the listeners themselves) take effect from the next pass.
//! - **No queueing, no retry**: an event with no listeners is simply dropped.
//!
//! There is no process-wide instance. Construct one, and hand clones of it to
//! whoever needs to register or dispatch; clones share the same table.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use arbus_core::{AsAny, CallbackError, CallbackResult, Event, EventListener, EventTypeId, ListenerId, ScopeId};

use crate::config::{BusConfig, DispatchPolicy};
use crate::scope::ListenerScope;
use crate::table::{Registration, RegistrationTable, Snapshot};

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    identity: EventTypeId,
    invoked: usize,
    skipped: usize,
    dispatched_at: DateTime<Utc>,
}

impl DispatchReport {
    fn new(identity: EventTypeId) -> Self {
        Self {
            identity,
            invoked: 0,
            skipped: 0,
            dispatched_at: Utc::now(),
        }
    }

    pub fn identity(&self) -> &EventTypeId {
        &self.identity
    }

    /// Number of listeners whose `notify` was called.
    pub fn invoked(&self) -> usize {
        self.invoked
    }

    /// Number of entries skipped because they were declared for another event type.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn dispatched_at(&self) -> DateTime<Utc> {
        self.dispatched_at
    }

    /// `true` when the event reached no listener at all.
    pub fn is_noop(&self) -> bool {
        self.invoked == 0
    }
}

/// Entry point for event sources (result owners, routers, tests).
///
/// Sources post through this trait rather than a concrete bus so they can be
/// wired to a recording sink in tests.
pub trait EventSink: Send + Sync {
    fn post(&self, event: &dyn Event) -> CallbackResult<DispatchReport>;
}

impl<S> EventSink for Arc<S>
where
    S: EventSink + ?Sized,
{
    fn post(&self, event: &dyn Event) -> CallbackResult<DispatchReport> {
        (**self).post(event)
    }
}

#[derive(Debug, Default)]
struct BusInner {
    config: BusConfig,
    table: RegistrationTable,
}

/// Typed registration and synchronous dispatch of activity results.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                table: RegistrationTable::new(),
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// The underlying registration table.
    pub fn table(&self) -> &RegistrationTable {
        &self.inner.table
    }

    /// Append `listener` to the listeners awaiting `identity`.
    ///
    /// The bus keeps a strong reference until the entry is removed. Registering
    /// the same listener twice yields two entries and two notifications.
    pub fn register<E: Event>(
        &self,
        identity: impl Into<EventTypeId>,
        listener: Arc<dyn EventListener<E>>,
    ) -> ListenerId {
        self.insert(Registration::new(identity.into(), listener))
    }

    /// Like [`EventBus::register`], but the entry is removed by the first dispatch that reaches it.
    pub fn register_once<E: Event>(
        &self,
        identity: impl Into<EventTypeId>,
        listener: Arc<dyn EventListener<E>>,
    ) -> ListenerId {
        self.insert(Registration::new(identity.into(), listener).once())
    }

    /// Register a listener under the identity of its event type.
    pub fn on<E, L>(&self, listener: L) -> ListenerId
    where
        E: Event,
        L: EventListener<E> + 'static,
    {
        self.register::<E>(EventTypeId::of::<E>(), Arc::new(listener))
    }

    /// One-shot variant of [`EventBus::on`].
    pub fn once<E, L>(&self, listener: L) -> ListenerId
    where
        E: Event,
        L: EventListener<E> + 'static,
    {
        self.register_once::<E>(EventTypeId::of::<E>(), Arc::new(listener))
    }

    pub(crate) fn insert(&self, registration: Registration) -> ListenerId {
        debug!(
            identity = %registration.identity(),
            listener_id = %registration.id(),
            once = registration.is_once(),
            "listener registered"
        );
        self.inner.table.insert(registration)
    }

    /// Remove `listener` from `identity`.
    ///
    /// Removes the first or every matching entry depending on
    /// [`BusConfig::unregister_policy`]. Returns how many entries were removed;
    /// removing an absent listener is a no-op.
    pub fn unregister<L>(&self, identity: impl Into<EventTypeId>, listener: &Arc<L>) -> usize
    where
        L: ?Sized,
    {
        let identity = identity.into();
        let removed = self
            .inner
            .table
            .remove_listener(&identity, listener, self.inner.config.unregister_policy);
        debug!(identity = %identity, removed, "listener unregistered");
        removed
    }

    /// Remove a single entry by the id `register` returned.
    pub fn unregister_id(&self, id: ListenerId) -> bool {
        let removed = self.inner.table.remove_id(id);
        debug!(listener_id = %id, removed, "listener unregistered by id");
        removed
    }

    /// Remove every entry registered through the scope `scope`.
    pub fn unregister_scope(&self, scope: ScopeId) -> usize {
        let removed = self.inner.table.remove_scope(scope);
        debug!(scope_id = %scope, removed, "listener scope closed");
        removed
    }

    /// Open a scope whose registrations are all removed when it is closed or dropped.
    pub fn scope(&self) -> ListenerScope {
        ListenerScope::new(self.clone())
    }

    /// Ordered snapshot of the entries awaiting `identity` (empty if none).
    pub fn listeners_for(&self, identity: &EventTypeId) -> Snapshot {
        self.inner.table.listeners_for(identity)
    }

    pub fn count_for(&self, identity: &EventTypeId) -> usize {
        self.inner.table.count_for(identity)
    }

    /// Total number of registration entries.
    pub fn len(&self) -> usize {
        self.inner.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.table.is_empty()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.inner.table.clear();
        debug!("event bus cleared");
    }

    /// Deliver `event` to every listener registered for its identity.
    ///
    /// Listeners run synchronously, in registration order, on the calling
    /// thread. An event nobody listens for is a silent no-op.
    ///
    /// A listener error is returned exactly as the listener produced it. Under
    /// [`DispatchPolicy::FailFast`] the pass stops there; under
    /// [`DispatchPolicy::IsolateAndContinue`] the remaining listeners still run
    /// and the first error is returned at the end.
    pub fn dispatch(&self, event: &dyn Event) -> CallbackResult<DispatchReport> {
        let identity = event.event_type();
        let snapshot = self.inner.table.listeners_for(&identity);
        let payload = AsAny::as_any(event);

        let mut report = DispatchReport::new(identity);
        let mut first_failure: Option<CallbackError> = None;

        for registration in snapshot.iter() {
            // One-shot entries leave the table only when a pass reaches them.
            if registration.is_once() && !self.inner.table.claim(&report.identity, registration.id()) {
                continue;
            }
            match registration.notify(payload) {
                None => {
                    report.skipped += 1;
                    warn!(
                        identity = %report.identity,
                        listener_id = %registration.id(),
                        expected = registration.event_type_name(),
                        "listener skipped: event type does not match its declaration"
                    );
                }
                Some(Ok(())) => report.invoked += 1,
                Some(Err(err)) => {
                    report.invoked += 1;
                    match self.inner.config.dispatch_policy {
                        DispatchPolicy::FailFast => {
                            debug!(
                                identity = %report.identity,
                                listener_id = %registration.id(),
                                "listener failed; dispatch stopped"
                            );
                            return Err(err);
                        }
                        DispatchPolicy::IsolateAndContinue => {
                            error!(
                                identity = %report.identity,
                                listener_id = %registration.id(),
                                error = %err,
                                "listener failed; continuing dispatch"
                            );
                            first_failure.get_or_insert(err);
                        }
                    }
                }
            }
        }

        if let Some(err) = first_failure {
            return Err(err);
        }

        debug!(
            identity = %report.identity,
            invoked = report.invoked,
            skipped = report.skipped,
            "event dispatched"
        );
        Ok(report)
    }
}

impl EventSink for EventBus {
    fn post(&self, event: &dyn Event) -> CallbackResult<DispatchReport> {
        self.dispatch(event)
    }
}
