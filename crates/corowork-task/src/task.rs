//! `Task<T>`, a fire-and-forget coroutine with an optional return value.
//!
//! Grounded on `cc_task.h`/`cc_task_types.h` and the `TaskAwaiter` in
//! `cc_awaitables.h`: the "ready/suspend/resume" triple is realized
//! directly by `Future::poll`, with `await_ready` folded into the first
//! branch of `poll` (resolve synchronously when already complete, register
//! a waker and return `Pending` otherwise).

use crate::job::{self, BoxedFuture};
use crate::lock::CompletionLock;
use corowork_pool::{default_scheduler, Scheduler};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A spawned asynchronous computation. Cheaply `Clone` (an `Arc` clone of
/// its completion lock) and awaitable from as many places as needed.
pub struct Task<T> {
    lock: Arc<CompletionLock<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self { lock: Arc::clone(&self.lock) }
    }
}

impl<T: Send + 'static> Task<T> {
    /// Spawns `future` on the process-wide default scheduler.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self::spawn_on(future, default_scheduler())
    }

    /// Spawns `future` on an explicit scheduler. The task's continuations
    /// always resume on this scheduler, regardless of which scheduler the
    /// awaiting task belongs to.
    pub fn spawn_on<F>(future: F, scheduler: Arc<dyn Scheduler>) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let lock = Arc::new(CompletionLock::new());
        let lock_for_body = Arc::clone(&lock);
        let wrapped: BoxedFuture = Box::pin(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(value) => lock_for_body.complete_ok(value),
                Err(panic) => lock_for_body.complete_err(panic),
            }
        });
        job::spawn_on(wrapped, scheduler);
        Self { lock }
    }

    pub(crate) fn lock(&self) -> &Arc<CompletionLock<T>> {
        &self.lock
    }
}

impl<T: Clone> Task<T> {
    /// Blocks the calling (non-worker) thread until the task completes,
    /// then returns its value or re-raises its panic.
    pub fn wait(&self) -> T {
        self.lock.wait_blocking();
        self.resolve()
    }

    fn resolve(&self) -> T {
        if let Some(panic) = self.lock.take_failure() {
            panic.resume();
        }
        self.lock.cloned_value().expect("task completed without producing a value")
    }
}

/// The `Future` returned by awaiting `&Task<T>`. Matches `TaskAwaiter` in
/// the original design: resolves synchronously if already complete,
/// otherwise registers a waker and suspends.
impl<T: Clone> Future for &Task<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        if self.lock.is_completed() {
            return Poll::Ready(self.resolve());
        }
        self.lock.append_waker(cx.waker().clone());
        if self.lock.is_completed() {
            return Poll::Ready(self.resolve());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corowork_pool::ThreadPool;

    #[test]
    fn spawned_task_resolves_to_its_return_value() {
        let pool = ThreadPool::build(2);
        let task = Task::spawn_on(async { 1 + 1 }, pool.clone() as Arc<dyn Scheduler>);
        assert_eq!(task.wait(), 2);
        pool.stop();
    }

    #[test]
    fn panicking_task_body_is_observed_by_wait() {
        let pool = ThreadPool::build(2);
        let task: Task<()> =
            Task::spawn_on(async { panic!("boom") }, pool.clone() as Arc<dyn Scheduler>);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.wait()));
        assert!(result.is_err());
        pool.stop();
    }
}
