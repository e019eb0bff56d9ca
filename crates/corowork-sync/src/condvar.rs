//! `AsyncCondVar`, a suspending condition variable.
//!
//! Grounded on the same `cc_sync_utils.h` family as [`crate::mutex`]: a
//! queue of waiting continuations, notified explicitly rather than tied to
//! any particular mutex. Per `SPEC_FULL.md` §4.8, `wait()` always suspends
//! on its first poll — there is no "already signalled" fast path, since a
//! condvar carries no state of its own to fast-path against.

use corowork_queue::UnboundedMpmcQueue;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// A condition variable whose `wait()` suspends the awaiting task rather
/// than blocking a thread. Carries no association with any particular
/// [`crate::AsyncMutex`] — callers re-acquire their own mutex after waking,
/// same as `std::sync::Condvar`.
#[derive(Default)]
pub struct AsyncCondVar {
    waiters: UnboundedMpmcQueue<Waker>,
}

impl AsyncCondVar {
    pub fn new() -> Self {
        Self { waiters: UnboundedMpmcQueue::new() }
    }

    /// Suspends the calling task until a matching `notify_one`/`notify_all`.
    /// Always registers on the first poll; never resolves synchronously.
    pub fn wait(&self) -> WaitFuture<'_> {
        WaitFuture { condvar: self, registered: false }
    }

    /// Wakes a single waiting task, if any are registered.
    pub fn notify_one(&self) {
        if let Some(waker) = self.waiters.pop() {
            waker.wake();
        }
    }

    /// Wakes every currently waiting task.
    pub fn notify_all(&self) {
        while let Some(waker) = self.waiters.pop() {
            waker.wake();
        }
    }
}

/// The `Future` returned by [`AsyncCondVar::wait`].
pub struct WaitFuture<'a> {
    condvar: &'a AsyncCondVar,
    registered: bool,
}

impl Future for WaitFuture<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.registered {
            return Poll::Ready(());
        }
        this.registered = true;
        this.condvar.waiters.push(cx.waker().clone());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AsyncMutex;
    use corowork_pool::{Scheduler, ThreadPool};
    use corowork_task::Task;
    use std::sync::Arc;

    #[test]
    fn notify_one_wakes_exactly_one_waiter() {
        let pool = ThreadPool::build(4);
        let condvar = Arc::new(AsyncCondVar::new());
        let woken = Arc::new(AsyncMutex::new(0usize));

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let condvar = Arc::clone(&condvar);
                let woken = Arc::clone(&woken);
                let task: Task<()> = Task::spawn_on(
                    async move {
                        condvar.wait().await;
                        *woken.lock().await += 1;
                    },
                    pool.clone() as Arc<dyn Scheduler>,
                );
                task
            })
            .collect();

        // Give the waiters a chance to register before notifying.
        std::thread::sleep(std::time::Duration::from_millis(50));
        condvar.notify_one();
        std::thread::sleep(std::time::Duration::from_millis(50));

        let count: Task<usize> = {
            let woken = Arc::clone(&woken);
            Task::spawn_on(async move { *woken.lock().await }, pool.clone() as Arc<dyn Scheduler>)
        };
        assert_eq!(count.wait(), 1);

        condvar.notify_all();
        for w in waiters {
            w.wait();
        }
        pool.stop();
    }
}
