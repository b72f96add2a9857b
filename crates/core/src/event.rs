//! Event values and their routing identity.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;

/// Stable routing key of an event.
///
/// This is the **only** thing the bus matches on. Two events that should reach
/// the same listeners must resolve to equal identities.
///
/// - `Type`: derived from the Rust type of the event (the default).
/// - `Named`: an explicit token (e.g. `"ACT_RESULT_1"`), for callers that route
///   several payload types, or one payload type several ways, by name.
///
/// A `Type` identity compares and hashes by its `TypeId` alone; `name` is only
/// for display, since `type_name` output is not guaranteed to be stable.
#[derive(Debug, Clone)]
pub enum EventTypeId {
    Type { id: TypeId, name: &'static str },
    Named(Cow<'static, str>),
}

impl PartialEq for EventTypeId {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Type { id: a, .. }, Self::Type { id: b, .. }) => a == b,
            (Self::Named(a), Self::Named(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for EventTypeId {}

impl Hash for EventTypeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Self::Type { id, .. } => id.hash(state),
            Self::Named(name) => name.hash(state),
        }
    }
}

impl EventTypeId {
    /// Identity derived from the type `T`.
    pub fn of<T: ?Sized + Any>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Identity given by an explicit name.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Named(name.into())
    }

    /// Human-readable form (type path or the explicit name).
    pub fn name(&self) -> &str {
        match self {
            Self::Type { name, .. } => name,
            Self::Named(name) => name,
        }
    }
}

impl fmt::Display for EventTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&'static str> for EventTypeId {
    fn from(value: &'static str) -> Self {
        Self::named(value)
    }
}

impl From<String> for EventTypeId {
    fn from(value: String) -> Self {
        Self::named(value)
    }
}

/// Upcast helper so `&dyn Event` can be downcast to its concrete type.
///
/// Call it as `AsAny::as_any(event)` on a `&dyn Event`; method syntax on a
/// `Box<dyn Event>` would resolve to the box itself.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A result payload that can travel through the bus.
///
/// Events are:
/// - **owned** (`'static`) so listeners can be stored independently of them
/// - **shareable** across threads
/// - routed by [`Event::event_type`], which defaults to the Rust type
pub trait Event: AsAny + Send + Sync {
    fn event_type(&self) -> EventTypeId {
        EventTypeId::of::<Self>()
    }
}
