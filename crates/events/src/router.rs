//! Result routing: raw activity results -> typed events.
//!
//! A launched action finishes with an integer result code and an optional
//! payload. A [`ResultRouter`] holds one mapper per result code that turns the
//! payload into an event (or into nothing), posts that event to an
//! [`EventSink`], and then runs any follow-up procedures queued for the result.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

use arbus_core::{CallbackResult, Consumer, Event, Mapper, Procedure};

use crate::bus::{DispatchReport, EventSink};

/// The action finished successfully.
pub const RESULT_OK: i32 = -1;
/// The action was cancelled (or did not report a result).
pub const RESULT_CANCELED: i32 = 0;
/// First result code available for application-defined outcomes.
pub const RESULT_FIRST_USER: i32 = 1;

/// Raw outcome of a launched action, as handed over by the result owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityResult<D> {
    pub result_code: i32,
    pub data: Option<D>,
}

impl<D> ActivityResult<D> {
    pub fn new(result_code: i32, data: Option<D>) -> Self {
        Self { result_code, data }
    }

    pub fn ok(data: D) -> Self {
        Self::new(RESULT_OK, Some(data))
    }

    pub fn canceled() -> Self {
        Self::new(RESULT_CANCELED, None)
    }

    pub fn is_ok(&self) -> bool {
        self.result_code == RESULT_OK
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// Routing was attempted with no result mapper configured.
    #[error("no result mappers configured")]
    NoResultMappers,
}

type ResultHandler<D> = Box<dyn Fn(Option<D>) -> CallbackResult<Option<Box<dyn Event>>> + Send + Sync>;

/// Maps result codes to events and posts them.
pub struct ResultRouter<D> {
    handlers: HashMap<i32, ResultHandler<D>>,
    follow_ups: Mutex<VecDeque<Box<dyn Procedure>>>,
}

impl<D: 'static> ResultRouter<D> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            follow_ups: Mutex::new(VecDeque::new()),
        }
    }

    /// Map results carrying `result_code` into an event (`None` posts nothing).
    ///
    /// A later mapper for the same code replaces the earlier one.
    pub fn add_result_mapper<E, M>(mut self, result_code: i32, mapper: M) -> Self
    where
        E: Event,
        M: Mapper<Option<D>, Option<E>> + 'static,
    {
        self.handlers.insert(
            result_code,
            Box::new(move |data: Option<D>| -> CallbackResult<Option<Box<dyn Event>>> {
                Ok(mapper.invoke(data).map(|event| Box::new(event) as Box<dyn Event>))
            }),
        );
        self
    }

    /// Run `consumer` for results carrying `result_code`, without posting an event.
    pub fn do_on_result<C>(mut self, result_code: i32, consumer: C) -> Self
    where
        C: Consumer<Option<D>> + 'static,
    {
        self.handlers.insert(
            result_code,
            Box::new(move |data: Option<D>| -> CallbackResult<Option<Box<dyn Event>>> {
                consumer.invoke(data)?;
                Ok(None)
            }),
        );
        self
    }

    /// Queue `procedure` to run once, after the next routed result.
    pub fn after_result<P>(&self, procedure: P)
    where
        P: Procedure + 'static,
    {
        self.queue().push_back(Box::new(procedure));
    }

    pub fn handles(&self, result_code: i32) -> bool {
        self.handlers.contains_key(&result_code)
    }

    pub fn pending_follow_ups(&self) -> usize {
        self.queue().len()
    }

    /// Fails when no mapper has been configured; such a router can never
    /// produce an event.
    pub fn validate(&self) -> Result<(), RouterError> {
        if self.handlers.is_empty() {
            return Err(RouterError::NoResultMappers);
        }
        Ok(())
    }

    /// Map `result` and post the resulting event (if any) to `sink`.
    ///
    /// Results whose code has no mapper produce no event. Follow-up procedures
    /// run after the post, in the order they were queued. Any mapper, consumer,
    /// listener or procedure failure is returned as-is and leaves the
    /// remaining follow-ups queued.
    pub fn route<S>(&self, result: ActivityResult<D>, sink: &S) -> CallbackResult<Option<DispatchReport>>
    where
        S: EventSink + ?Sized,
    {
        self.validate()?;

        let report = match self.handlers.get(&result.result_code) {
            Some(handler) => match handler(result.data)? {
                Some(event) => Some(sink.post(&*event)?),
                None => None,
            },
            None => {
                debug!(result_code = result.result_code, "no result mapper for result code");
                None
            }
        };

        self.run_follow_ups()?;
        Ok(report)
    }

    fn run_follow_ups(&self) -> CallbackResult {
        // Pop one at a time, outside the lock, so a procedure may queue further follow-ups.
        loop {
            let next = self.queue().pop_front();
            let Some(procedure) = next else {
                return Ok(());
            };
            procedure.invoke()?;
        }
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Box<dyn Procedure>>> {
        self.follow_ups.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: 'static> Default for ResultRouter<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> core::fmt::Debug for ResultRouter<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut codes: Vec<_> = self.handlers.keys().copied().collect();
        codes.sort_unstable();
        f.debug_struct("ResultRouter").field("result_codes", &codes).finish()
    }
}
