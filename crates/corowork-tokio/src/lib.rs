//! `TokioScheduler`, an alternate [`corowork_pool::Scheduler`] that dispatches
//! onto a tokio runtime instead of `corowork-pool`'s own worker threads.
//!
//! Exists to demonstrate that `corowork-task`'s task types are scheduler-
//! agnostic: nothing in `Task`/`ValueTask`/`Generator` names `ThreadPool`
//! directly, only the `Scheduler` trait object captured at spawn time.
//! Grounded on the teacher's own `tokio = { features = ["full"] }`
//! dependency and the `tokio::task::JoinHandle`-based dispatch shown in
//! `knhk-workflow-engine`'s `work_stealing.rs`.

use corowork_pool::{Job, Scheduler};
use tokio::runtime::Handle;
use tracing::trace;

/// Schedules corowork jobs onto a tokio [`Handle`]'s worker pool.
///
/// Each job is a single, non-blocking `poll()` of a task's inner future, so
/// it is dispatched with a plain `spawn` rather than `spawn_blocking` — a
/// job that itself blocks a tokio worker (e.g. a task body calling
/// `Task::wait` synchronously) is a caller bug independent of which
/// scheduler is in use.
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Binds to the tokio runtime the calling thread is currently inside
    /// (i.e. must be called from within a `#[tokio::main]`/`Runtime::block_on`
    /// context).
    pub fn current() -> Self {
        Self { handle: Handle::current() }
    }

    /// Binds to an explicit runtime handle, usable from outside tokio's own
    /// context (e.g. a plain `std::thread` holding a `Handle` it was given).
    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, job: Job) {
        trace!("dispatching job onto tokio runtime");
        self.handle.spawn(async move { job.run() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corowork_pool::ThreadPool;
    use corowork_task::Task;
    use std::sync::Arc;

    #[test]
    fn task_spawned_on_tokio_scheduler_resumes_there() {
        // Scenario 6: a task bound to a custom scheduler at spawn time must
        // have its continuations dispatched through that same scheduler,
        // never through whatever scheduler an awaiting thread belongs to.
        // The outer task awaits an inner task bound to a different
        // scheduler so it genuinely suspends — a body with no `.await`
        // would pass this assertion even if the binding were broken.
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("corowork-tokio-test")
            .build()
            .expect("failed to build tokio runtime");

        let scheduler: Arc<dyn Scheduler> = {
            let _guard = runtime.enter();
            Arc::new(TokioScheduler::current())
        };

        let default_pool = ThreadPool::build(2);
        let default_scheduler = default_pool.clone() as Arc<dyn Scheduler>;

        let inner = Task::spawn_on(async { 7 }, default_scheduler);
        let task: Task<bool> = Task::spawn_on(
            async move {
                let value = (&inner).await;
                let on_tokio_thread = std::thread::current()
                    .name()
                    .map(|n| n.starts_with("corowork-tokio-test"))
                    .unwrap_or(false);
                value == 7 && on_tokio_thread
            },
            Arc::clone(&scheduler),
        );

        assert!(task.wait(), "task body did not resume on its bound scheduler after awaiting another task");
        default_pool.stop();
        runtime.shutdown_background();
    }
}
