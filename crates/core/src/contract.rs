//! Callback contracts (single-method capability traits).
//!
//! The bus never stores "a function" in the abstract. It stores one of four
//! closed shapes, each a one-method trait:
//!
//! | contract              | signature                        |
//! |-----------------------|----------------------------------|
//! | [`Mapper<T, R>`]      | `T -> R`                         |
//! | [`Consumer<T>`]       | `T -> CallbackResult`            |
//! | [`Procedure`]         | `() -> CallbackResult`           |
//! | [`EventListener<E>`]  | `&E -> CallbackResult`           |
//!
//! Every contract has a blanket implementation for closures of the matching
//! shape, so `|cat: &CatChosen| Ok(())` *is* an `EventListener<CatChosen>`.
//! Hand-written types can implement the traits directly.

use crate::error::CallbackResult;

/// Transformation contract (`T -> R`).
///
/// Callers must not assume purity, but nothing in the bus relies on side effects
/// of a mapper either.
pub trait Mapper<T, R>: Send + Sync {
    fn invoke(&self, arg: T) -> R;
}

impl<T, R, F> Mapper<T, R> for F
where
    F: Fn(T) -> R + Send + Sync,
{
    fn invoke(&self, arg: T) -> R {
        self(arg)
    }
}

/// Side-effecting contract with one input and no result.
///
/// A failure is returned to whoever invoked the consumer; it is never swallowed.
pub trait Consumer<T>: Send + Sync {
    fn invoke(&self, arg: T) -> CallbackResult;
}

impl<T, F> Consumer<T> for F
where
    F: Fn(T) -> CallbackResult + Send + Sync,
{
    fn invoke(&self, arg: T) -> CallbackResult {
        self(arg)
    }
}

/// Side-effecting contract with no input and no result.
pub trait Procedure: Send + Sync {
    fn invoke(&self) -> CallbackResult;
}

impl<F> Procedure for F
where
    F: Fn() -> CallbackResult + Send + Sync,
{
    fn invoke(&self) -> CallbackResult {
        self()
    }
}

/// The contract events are dispatched through.
///
/// Semantically a `Consumer<&E>`, kept as its own trait so that registration
/// APIs only accept things written as event handlers.
pub trait EventListener<E: ?Sized>: Send + Sync {
    fn notify(&self, event: &E) -> CallbackResult;
}

impl<E, F> EventListener<E> for F
where
    E: ?Sized,
    F: Fn(&E) -> CallbackResult + Send + Sync,
{
    fn notify(&self, event: &E) -> CallbackResult {
        self(event)
    }
}

/// Adapt a consumer of `&E` into an event listener for `E`.
///
/// This is the explicit opt-in for reusing a generic consumer as an event
/// handler.
pub fn listener_from_consumer<E, C>(consumer: C) -> impl EventListener<E>
where
    E: ?Sized,
    C: for<'a> Consumer<&'a E>,
{
    move |event: &E| consumer.invoke(event)
}

/// Adapt a procedure into a consumer that ignores its input.
pub fn ignoring_input<T, P>(procedure: P) -> impl Consumer<T>
where
    P: Procedure,
{
    move |_: T| procedure.invoke()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl EventListener<str> for Recorder {
        fn notify(&self, event: &str) -> CallbackResult {
            self.seen.lock().unwrap().push(event.to_string());
            Ok(())
        }
    }

    fn call_mapper<M: Mapper<i32, String>>(m: &M, arg: i32) -> String {
        m.invoke(arg)
    }

    #[test]
    fn closures_bind_to_each_shape() {
        let doubled = call_mapper(&|x: i32| (x * 2).to_string(), 21);
        assert_eq!(doubled, "42");

        let total = AtomicUsize::new(0);
        let add = |x: usize| -> CallbackResult {
            total.fetch_add(x, Ordering::SeqCst);
            Ok(())
        };
        Consumer::invoke(&add, 5).unwrap();

        let bump = || -> CallbackResult {
            total.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        Procedure::invoke(&bump).unwrap();

        let listen = |x: &usize| -> CallbackResult {
            total.fetch_add(*x, Ordering::SeqCst);
            Ok(())
        };
        listen.notify(&10).unwrap();

        assert_eq!(total.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn hand_written_listener_over_unsized_event() {
        let recorder = Recorder {
            seen: Mutex::new(Vec::new()),
        };
        recorder.notify("ACT_RESULT_1").unwrap();
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["ACT_RESULT_1".to_string()]);
    }

    #[test]
    fn consumer_failure_is_returned_unchanged() {
        let failing = |_: u8| -> CallbackResult { Err(anyhow::anyhow!("boom")) };
        let err = Consumer::invoke(&failing, 1).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn adapters_preserve_behavior() {
        let hits = AtomicUsize::new(0);
        let consumer = |n: &u32| -> CallbackResult {
            hits.fetch_add(*n as usize, Ordering::SeqCst);
            Ok(())
        };
        let listener = listener_from_consumer::<u32, _>(consumer);
        listener.notify(&3).unwrap();

        let procedure = || -> CallbackResult {
            hits.fetch_add(100, Ordering::SeqCst);
            Ok(())
        };
        let consumer = ignoring_input::<&str, _>(procedure);
        consumer.invoke("ignored").unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 103);
    }
}
