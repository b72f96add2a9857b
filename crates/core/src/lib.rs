//! `arbus-core`: callback contracts and event identity.
//!
//! This crate contains the **invocation vocabulary** of the activity result bus
//! (no registration tables, no dispatch, no IO).

pub mod contract;
pub mod error;
pub mod event;
pub mod id;

pub use contract::{Consumer, EventListener, Mapper, Procedure, ignoring_input, listener_from_consumer};
pub use error::{CallbackError, CallbackResult};
pub use event::{AsAny, Event, EventTypeId};
pub use id::{ListenerId, ScopeId};
