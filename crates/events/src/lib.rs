//! Activity result events: registration table, dispatcher, scopes and result routing.

pub mod bus;
pub mod config;
pub mod router;
pub mod scope;
pub mod table;

pub use bus::{DispatchReport, EventBus, EventSink};
pub use config::{BusConfig, ConfigError, DispatchPolicy, UnregisterPolicy};
pub use router::{ActivityResult, RESULT_CANCELED, RESULT_FIRST_USER, RESULT_OK, ResultRouter, RouterError};
pub use scope::ListenerScope;
pub use table::{Registration, RegistrationTable, Snapshot};

pub use arbus_core::{
    AsAny, CallbackError, CallbackResult, Consumer, Event, EventListener, EventTypeId, ListenerId, Mapper,
    Procedure, ScopeId, ignoring_input, listener_from_consumer,
};
