//! `ValueTask<T>`, a single-awaiter optimisation of [`crate::Task`].
//!
//! Grounded on `cc_value_task.h` and `Single_Awaitable_Task_lock<T>` in
//! `cc_task_locks.h`. Unlike `Task<T>`, at most one awaiter may ever
//! register; a second attempt resolves to `Err(RuntimeError::DoubleAwait)`
//! rather than panicking, since a caller racing two awaiters is a logic
//! error the library can report rather than one it needs to crash on.

use crate::error::RuntimeError;
use crate::job::{self, BoxedFuture};
use crate::lock::{AddAwaiterOutcome, SingleAwaiterLock};
use corowork_pool::{default_scheduler, Scheduler};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

pub struct ValueTask<T> {
    lock: Arc<SingleAwaiterLock<T>>,
}

impl<T> Clone for ValueTask<T> {
    fn clone(&self) -> Self {
        Self { lock: Arc::clone(&self.lock) }
    }
}

impl<T: Send + 'static> ValueTask<T> {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self::spawn_on(future, default_scheduler())
    }

    pub fn spawn_on<F>(future: F, scheduler: Arc<dyn Scheduler>) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let lock = Arc::new(SingleAwaiterLock::new());
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
}

impl<T> ValueTask<T> {
    /// Blocks the calling thread until the value is produced, or returns
    /// `Err(RuntimeError::DoubleAwait)` if some other awaiter already won
    /// registration first.
    pub fn wait(&self) -> Result<T, RuntimeError> {
        // A blocking wait never goes through `add_awaiter`, so it never
        // competes for the single-awaiter slot; it only needs completion.
        self.lock.wait_blocking();
        self.resolve()
    }

    fn resolve(&self) -> Result<T, RuntimeError> {
        if let Some(panic) = self.lock.take_failure() {
            panic.resume();
        }
        self.lock.take_value().ok_or(RuntimeError::MissingValue)
    }
}

impl<T> Future for &ValueTask<T> {
    type Output = Result<T, RuntimeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.lock.add_awaiter(cx.waker().clone()) {
            AddAwaiterOutcome::AlreadyComplete => Poll::Ready(self.resolve()),
            AddAwaiterOutcome::DoubleAwait => Poll::Ready(Err(RuntimeError::DoubleAwait)),
            AddAwaiterOutcome::Registered => {
                if self.lock.is_completed() {
                    Poll::Ready(self.resolve())
                } else {
                    Poll::Pending
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corowork_pool::ThreadPool;

    #[test]
    fn resolves_to_its_value() {
        let pool = ThreadPool::build(2);
        let task = ValueTask::spawn_on(async { 41 + 1 }, pool.clone() as Arc<dyn Scheduler>);
        assert_eq!(task.wait(), Ok(42));
        pool.stop();
    }
}
