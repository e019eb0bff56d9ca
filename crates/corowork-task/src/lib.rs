//! The four user-facing task types and the `when_all` composition operator,
//! built atop `corowork-pool`'s scheduler and `corowork-queue`'s lock-free
//! structures.
//!
//! A task's state machine ("lock") is private to this crate; `Task`,
//! `ValueTask`, and `Generator` are the only types callers ever hold. Every
//! task is spawned onto a [`corowork_pool::Scheduler`] (the process-wide
//! default `ThreadPool` unless `spawn_on` is used explicitly), and every
//! continuation it releases is rescheduled through that same scheduler, not
//! whichever scheduler the awaiting thread happens to belong to.

mod error;
mod generator;
mod job;
mod lock;
mod task;
mod value_task;
mod when_all;

pub use error::{AggregatePanics, CapturedPanic, RuntimeError, TaskPanic};
pub use generator::{spawn_generator, Generator, Yielder};
pub use task::Task;
pub use value_task::ValueTask;
pub use when_all::when_all;
