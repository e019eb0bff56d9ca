//! The unit of work the pool moves between queues.
//!
//! The pool itself has no notion of `Future`/`Waker`; it only ever runs
//! opaque [`Runnable`]s. `corowork-task` supplies the `Runnable` impl that
//! drives a task's inner future to completion one poll at a time and
//! re-submits itself on wake.

use std::sync::Arc;

/// One schedulable unit of work.
///
/// `run` is called by a worker thread and must not block for longer than a
/// single poll of the underlying future would — blocking a worker thread
/// starves every other job pending on that worker's local ring.
pub trait Runnable: Send + Sync {
    fn run(self: Arc<Self>);
}

/// A reference-counted handle to one schedulable unit of work.
pub type Job = Arc<dyn Runnable>;
