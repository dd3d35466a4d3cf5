//! Panic isolation for item bodies.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Outcome of a guarded call.
#[derive(Debug)]
pub enum Guarded<T> {
    /// The closure returned normally.
    Returned(T),
    /// The closure panicked; carries the panic message.
    Panicked(String),
}

/// Runs `f`, turning a panic into [`Guarded::Panicked`].
///
/// Item bodies and user callbacks run through this so a panic never
/// takes down a worker thread. The closure is asserted unwind safe: state
/// it shares with the rest of the job is behind locks or atomics.
pub fn execute_guarded<F, T>(f: F) -> Guarded<T>
where
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Guarded::Returned(value),
        Err(payload) => Guarded::Panicked(panic_message(payload.as_ref())),
    }
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
