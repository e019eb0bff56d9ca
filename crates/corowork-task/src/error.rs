//! Typed error surface for the task runtime.

use std::any::Any;
use std::sync::Mutex;
use thiserror::Error;

/// A captured, type-erased panic payload, carried on a task's lock instead
/// of being swallowed.
pub type TaskPanic = Box<dyn Any + Send + 'static>;

/// A panic captured off a task body, ready to be re-raised on whichever
/// thread observes the task's failure.
///
/// `Box<dyn Any + Send>` is move-only, so it can be handed to exactly one
/// caller via [`std::panic::resume_unwind`] with full type fidelity. A
/// `Task` is `Clone` and may be awaited from more than one place; whichever
/// resolver gets there first takes the real payload, and any later resolver
/// re-panics with the same message instead (there is no way to duplicate an
/// arbitrary `dyn Any` value in safe Rust).
pub struct CapturedPanic {
    message: String,
    payload: Mutex<Option<TaskPanic>>,
}

impl CapturedPanic {
    pub fn capture(payload: TaskPanic) -> Self {
        let message = describe(&payload);
        Self { message, payload: Mutex::new(Some(payload)) }
    }

    /// Re-raises the panic, unwinding past this call.
    pub fn resume(&self) -> ! {
        if let Some(payload) = self.payload.lock().unwrap().take() {
            std::panic::resume_unwind(payload);
        }
        panic!("{}", self.message);
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

fn describe(payload: &TaskPanic) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}

/// Errors surfaced by the task runtime itself, as distinct from a
/// propagated panic from a user task body (which is never wrapped in this
/// enum — it rides the lock as a [`CapturedPanic`] and is re-raised via
/// [`CapturedPanic::resume`]).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A value-bearing lock completed without ever receiving a value. Only
    /// reachable through a library bug: a driving future that resolved
    /// without ever calling `set_result`.
    #[error("task completed without producing a value")]
    MissingValue,

    /// `ValueTask` was awaited, or had an awaiter registered, more than
    /// once over its lifetime.
    #[error("ValueTask has already been awaited once")]
    DoubleAwait,

    /// A bounded generator consumer queue refused a registration. The
    /// default unbounded consumer queue never produces this.
    #[error("generator consumer queue is full")]
    GeneratorQueueFull,

    /// `when_all` completed with more than one input panicking.
    #[error("{0} of the awaited tasks panicked")]
    Aggregate(AggregatePanics),

    /// Runtime configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] corowork_pool::ConfigError),
}

/// The collected panics behind [`RuntimeError::Aggregate`].
///
/// Holds messages rather than the original [`CapturedPanic`]s: a
/// `CapturedPanic`'s payload is move-only (there is no way to duplicate an
/// arbitrary `dyn Any` in safe Rust), so once more than one input has
/// panicked there is no single payload left to re-raise with full type
/// fidelity — the aggregate reports what failed, the single-panic path in
/// `when_all` is what preserves exact payload identity.
pub struct AggregatePanics(pub Vec<String>);

impl AggregatePanics {
    pub fn messages(&self) -> Vec<&str> {
        self.0.iter().map(String::as_str).collect()
    }
}

impl std::fmt::Display for AggregatePanics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.len())
    }
}

impl std::fmt::Debug for AggregatePanics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatePanics").field("count", &self.0.len()).finish()
    }
}
