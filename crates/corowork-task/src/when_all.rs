//! `when_all`, the aggregate-completion composition operator.
//!
//! Grounded on `cc_awaitables.h`'s `MultiTaskAwaiter`: a control block
//! holding every input's lock plus an atomic completed-count. The resuming
//! waker is woken by whichever input happens to be the *last* one to
//! complete, guaranteeing the aggregate awaiter resumes exactly once no
//! matter how many inputs finish concurrently. Per the Source Ambiguities
//! resolution in `SPEC_FULL.md` §9, this only accepts a homogeneous
//! iterable of same-typed `Task<T>`s (not the original's heterogeneous
//! brace-initializer pack) — callers combining dissimilar task shapes erase
//! them to `Task<()>` first.

use crate::error::{AggregatePanics, RuntimeError};
use crate::lock::CompletionLock;
use crate::task::Task;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

struct ControlBlock<T> {
    locks: Vec<Arc<CompletionLock<T>>>,
    completed: AtomicUsize,
}

/// The `Future` returned by [`when_all`]. Resolves `Ok(())` once every input
/// has completed without panicking; a single panicking input re-raises it,
/// more than one is collected into [`RuntimeError::Aggregate`].
pub struct MultiTaskAwaiter<T> {
    ctrl: Arc<ControlBlock<T>>,
    registered: bool,
}

impl<T: Clone + Send + 'static> Future for MultiTaskAwaiter<T> {
    type Output = Result<(), RuntimeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.ctrl.locks.iter().all(|l| l.is_completed()) {
            return Poll::Ready(this.resolve());
        }
        if !this.registered {
            this.registered = true;
            for lock in &this.ctrl.locks {
                let ctrl = Arc::clone(&this.ctrl);
                let waker = cx.waker().clone();
                if lock.is_completed() {
                    increment_and_maybe_wake(&ctrl, waker);
                } else {
                    let ctrl_for_waiter = Arc::clone(&ctrl);
                    let waker_for_waiter = waker.clone();
                    // `append_waker` only accepts a plain `Waker`, so the
                    // "increment, and wake only if last" bookkeeping has to
                    // happen before we ever construct the waker we hand it:
                    // wrap the aggregate waker in one that does the
                    // increment when invoked.
                    lock.append_waker(make_counting_waker(ctrl_for_waiter, waker_for_waiter));
                }
            }
        }
        if this.ctrl.locks.iter().all(|l| l.is_completed()) {
            return Poll::Ready(this.resolve());
        }
        Poll::Pending
    }
}

impl<T: Clone> MultiTaskAwaiter<T> {
    fn resolve(&self) -> Result<(), RuntimeError> {
        let mut panics = Vec::new();
        for lock in &self.ctrl.locks {
            if let Some(panic) = lock.take_failure() {
                panics.push(panic);
            }
        }
        match panics.len() {
            0 => Ok(()),
            1 => panics[0].resume(),
            _ => {
                let messages = panics.iter().map(|p| p.message().to_string()).collect();
                Err(RuntimeError::Aggregate(AggregatePanics(messages)))
            }
        }
    }
}

fn increment_and_maybe_wake<T>(ctrl: &Arc<ControlBlock<T>>, waker: std::task::Waker) {
    let previous = ctrl.completed.fetch_add(1, Ordering::AcqRel);
    if previous + 1 == ctrl.locks.len() {
        waker.wake();
    }
}

/// Builds a `Waker` that, when woken, performs the "increment completed
/// count, wake the aggregate awaiter only if this was the last one" dance
/// instead of directly waking `inner`.
fn make_counting_waker<T>(ctrl: Arc<ControlBlock<T>>, inner: std::task::Waker) -> std::task::Waker {
    use std::task::Wake;

    struct CountingWake<T> {
        ctrl: Arc<ControlBlock<T>>,
        inner: std::task::Waker,
    }

    impl<T> Wake for CountingWake<T> {
        fn wake(self: Arc<Self>) {
            self.wake_by_ref();
        }
        fn wake_by_ref(self: &Arc<Self>) {
            increment_and_maybe_wake(&self.ctrl, self.inner.clone());
        }
    }

    std::task::Waker::from(Arc::new(CountingWake { ctrl, inner }))
}

/// Aggregates a homogeneous iterable of [`Task<T>`]s; the returned future
/// resolves once every input has completed.
pub fn when_all<T, I>(tasks: I) -> MultiTaskAwaiter<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Task<T>>,
{
    let locks: Vec<Arc<CompletionLock<T>>> = tasks.into_iter().map(|t| Arc::clone(t.lock())).collect();
    MultiTaskAwaiter {
        ctrl: Arc::new(ControlBlock { locks, completed: AtomicUsize::new(0) }),
        registered: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corowork_pool::{Scheduler, ThreadPool};
    use std::time::{Duration, Instant};

    #[test]
    fn resumes_once_every_input_completes() {
        let pool = ThreadPool::build(4);
        let tasks: Vec<Task<()>> = (0..4)
            .map(|_| {
                Task::spawn_on(
                    async {
                        std::thread::sleep(Duration::from_millis(50));
                    },
                    pool.clone() as Arc<dyn Scheduler>,
                )
            })
            .collect();

        let start = Instant::now();
        // `Result<(), RuntimeError>` isn't `Clone` (it carries a captured
        // panic payload), so the aggregate result is delivered through a
        // `ValueTask` rather than a `Task`, which has no such bound.
        let driver = crate::ValueTask::spawn_on(
            async move { when_all(tasks).await },
            pool.clone() as Arc<dyn Scheduler>,
        );
        let result = driver.wait().expect("driver task itself did not panic");
        // Parallelism: four 50ms sleeps running concurrently finish well
        // under their serial sum.
        assert!(start.elapsed() < Duration::from_millis(400));
        assert!(result.is_ok());
        pool.stop();
    }

    #[test]
    fn aggregates_multiple_panics() {
        let pool = ThreadPool::build(4);
        let tasks: Vec<Task<()>> = (0..3)
            .map(|i| {
                Task::spawn_on(
                    async move {
                        if i != 1 {
                            panic!("task {i} failed");
                        }
                    },
                    pool.clone() as Arc<dyn Scheduler>,
                )
            })
            .collect();
        let driver = crate::ValueTask::spawn_on(
            async move { when_all(tasks).await },
            pool.clone() as Arc<dyn Scheduler>,
        );
        match driver.wait().expect("driver task itself did not panic") {
            Err(RuntimeError::Aggregate(agg)) => assert_eq!(agg.messages().len(), 2),
            other => panic!("expected an aggregate error, got {other:?}"),
        }
        pool.stop();
    }

    #[test]
    fn single_panic_is_rethrown_directly() {
        let pool = ThreadPool::build(2);
        let tasks: Vec<Task<()>> = vec![
            Task::spawn_on(async {}, pool.clone() as Arc<dyn Scheduler>),
            Task::spawn_on(async { panic!("only one fails") }, pool.clone() as Arc<dyn Scheduler>),
        ];
        let driver: Task<()> = Task::spawn_on(
            async move {
                let _ = when_all(tasks).await;
            },
            pool.clone() as Arc<dyn Scheduler>,
        );
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| driver.wait()));
        assert!(result.is_err());
        pool.stop();
    }
}
