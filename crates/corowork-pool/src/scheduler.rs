//! The [`Scheduler`] trait and the thread-local "current scheduler" slot.
//!
//! A task's continuations are always rescheduled through the scheduler the
//! task itself was spawned against, never through whichever scheduler the
//! awaiting thread happens to belong to — see scenario 6 in the testable
//! properties.

use crate::Job;
use std::cell::RefCell;
use std::sync::Arc;

/// Abstracts "where a resumed job runs." The default implementation
/// dispatches onto a [`crate::ThreadPool`]; `corowork-tokio` provides an
/// alternate implementation that dispatches onto a tokio runtime.
pub trait Scheduler: Send + Sync + 'static {
    /// Submit `job` for execution. May run `job` inline if the calling
    /// thread is already a worker of this scheduler and has room in its
    /// local queue; otherwise queues it for another thread to pick up.
    fn schedule(&self, job: Job);

    /// Hook invoked whenever a task bound to this scheduler is first
    /// spawned (as opposed to rescheduled after a wake). The default
    /// implementation just forwards to `schedule`; a custom scheduler may
    /// override this to, e.g., record submission metrics.
    fn on_task_submitted(&self, job: Job) {
        self.schedule(job);
    }
}

thread_local! {
    static CURRENT_SCHEDULER: RefCell<Option<Arc<dyn Scheduler>>> = const { RefCell::new(None) };
}

/// Publishes `scheduler` as the current thread's scheduler for the
/// lifetime of the returned guard. Called once by each worker thread on
/// entry to its run loop.
pub struct CurrentSchedulerGuard {
    _private: (),
}

impl Drop for CurrentSchedulerGuard {
    fn drop(&mut self) {
        CURRENT_SCHEDULER.with(|cell| *cell.borrow_mut() = None);
    }
}

pub fn publish_current_scheduler(scheduler: Arc<dyn Scheduler>) -> CurrentSchedulerGuard {
    CURRENT_SCHEDULER.with(|cell| *cell.borrow_mut() = Some(scheduler));
    CurrentSchedulerGuard { _private: () }
}

/// Returns the scheduler published on the calling thread, if any. `spawn`
/// falls back to this when no explicit scheduler type parameter is given.
pub fn current_scheduler() -> Option<Arc<dyn Scheduler>> {
    CURRENT_SCHEDULER.with(|cell| cell.borrow().clone())
}
