//! `AsyncMutex<T>`, a suspending (non-blocking) mutual-exclusion lock.
//!
//! Grounded on `cc_sync_utils.h`'s `AsyncMutex`/`AsyncMutexLock` skeleton
//! (a `GenericQueue` of waiting continuations behind a shared lock object),
//! fleshed out per `SPEC_FULL.md` §4.8/§9: release is CAS-based rather than
//! the raw-`busy`-comparison path one version of the original source took.
//! Unlike `std::sync::Mutex`, `lock()` never blocks the calling thread — it
//! registers a waker and suspends the awaiting task, which is why this
//! lives in its own crate atop the waker/lock machinery `corowork-task`
//! builds, rather than atop `naml-std-threads`'s blocking `Mutex`.

use corowork_queue::UnboundedMpmcQueue;
use std::cell::{Cell, UnsafeCell};
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Waker};

/// A suspending mutual-exclusion lock around a `T`.
pub struct AsyncMutex<T> {
    busy: AtomicBool,
    waiters: UnboundedMpmcQueue<Waker>,
    value: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for AsyncMutex<T> {}
unsafe impl<T: Send> Sync for AsyncMutex<T> {}

impl<T> AsyncMutex<T> {
    pub fn new(value: T) -> Self {
        Self { busy: AtomicBool::new(false), waiters: UnboundedMpmcQueue::new(), value: UnsafeCell::new(value) }
    }

    /// Returns a future that resolves to a [`AsyncMutexGuard`] once the lock
    /// has been acquired. Never blocks the calling thread: if the lock is
    /// held, the awaiting task's waker is enqueued and the future suspends.
    pub fn lock(&self) -> LockFuture<'_, T> {
        LockFuture { mutex: self }
    }

    /// Releases the lock: CAS `busy` back to `false`, then drain every
    /// queued waiter and wake it. Each wake is a hint to retry, not a grant
    /// of ownership — the woken future re-CASes `busy` like any other
    /// contender, so there's no window where `busy` stays `true` with no
    /// live holder able to clear it. Waking the whole queue (rather than
    /// one entry) matters because a popped waiter can be stale — already
    /// resolved by its own earlier retry-CAS, so waking it is a no-op — and
    /// stopping at the first pop would strand every genuine waiter behind
    /// it.
    fn release(&self) {
        let _ = self.busy.compare_exchange(true, false, Ordering::Release, Ordering::Relaxed);
        while let Some(waker) = self.waiters.pop() {
            waker.wake();
        }
    }
}

impl<T: Default> Default for AsyncMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// The `Future` returned by [`AsyncMutex::lock`].
pub struct LockFuture<'a, T> {
    mutex: &'a AsyncMutex<T>,
}

impl<'a, T> Future for LockFuture<'a, T> {
    type Output = AsyncMutexGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        // Every poll — first attempt or a wake following an earlier
        // registration — tries the CAS itself. A wake from `release()` is
        // only a hint that `busy` might be free now, never a guaranteed
        // hand-off: treating it as a guarantee is what let a task resolve
        // via its own retry-CAS while a stale copy of its waker stayed
        // queued behind it, starving whoever queued up next.
        if this
            .mutex
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return Poll::Ready(AsyncMutexGuard::new(this.mutex));
        }

        this.mutex.waiters.push(cx.waker().clone());

        // A release() may have raced us between the failed CAS above and
        // this push landing, clearing `busy` while our waker wasn't queued
        // yet to be popped. Retry now that we're registered so that race
        // can't strand us; if we win here our own queued waker is now
        // stale, but waking it later just re-polls a future that will find
        // `busy` genuinely contested and requeue itself, so it's harmless.
        if this
            .mutex
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return Poll::Ready(AsyncMutexGuard::new(this.mutex));
        }

        Poll::Pending
    }
}

/// An RAII guard granting exclusive access to the mutex's contents.
/// Releases on `Drop`, or earlier via [`AsyncMutexGuard::release`].
pub struct AsyncMutexGuard<'a, T> {
    mutex: &'a AsyncMutex<T>,
    released: Cell<bool>,
}

impl<'a, T> AsyncMutexGuard<'a, T> {
    fn new(mutex: &'a AsyncMutex<T>) -> Self {
        Self { mutex, released: Cell::new(false) }
    }

    /// Releases the lock early. Idempotent: a guard that is released
    /// explicitly and then dropped does not double-release.
    pub fn release(self) {
        self.released.set(true);
        self.mutex.release();
    }
}

impl<T> Deref for AsyncMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for AsyncMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for AsyncMutexGuard<'_, T> {
    fn drop(&mut self) {
        if !self.released.get() {
            self.mutex.release();
        }
    }
}

unsafe impl<T: Send> Send for AsyncMutexGuard<'_, T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use corowork_pool::{Scheduler, ThreadPool};
    use corowork_task::Task;
    use std::sync::Arc;

    #[test]
    fn single_task_acquires_and_releases() {
        let pool = ThreadPool::build(2);
        let mutex = Arc::new(AsyncMutex::new(0));
        let mutex2 = Arc::clone(&mutex);
        let task: Task<()> = Task::spawn_on(
            async move {
                let mut guard = mutex2.lock().await;
                *guard += 1;
            },
            pool.clone() as Arc<dyn Scheduler>,
        );
        task.wait();
        let verify: Task<i32> = {
            let mutex = Arc::clone(&mutex);
            Task::spawn_on(async move { *mutex.lock().await }, pool.clone() as Arc<dyn Scheduler>)
        };
        assert_eq!(verify.wait(), 1);
        pool.stop();
    }

    #[test]
    fn sixteen_tasks_never_observe_concurrent_access() {
        // Scenario 5: 16 tasks each acquire, CAS a shared flag false->true,
        // CAS it true->false, release. Neither CAS may ever fail.
        let pool = ThreadPool::build(8);
        let mutex = Arc::new(AsyncMutex::new(()));
        let flag = Arc::new(AtomicBool::new(false));
        let violations = Arc::new(AtomicBool::new(false));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                let flag = Arc::clone(&flag);
                let violations = Arc::clone(&violations);
                Task::spawn_on(
                    async move {
                        let _guard = mutex.lock().await;
                        if flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
                            violations.store(true, Ordering::SeqCst);
                        }
                        if flag.compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst).is_err() {
                            violations.store(true, Ordering::SeqCst);
                        }
                    },
                    pool.clone() as Arc<dyn Scheduler>,
                )
            })
            .collect();

        for t in tasks {
            t.wait();
        }
        assert!(!violations.load(Ordering::SeqCst));
        pool.stop();
    }
}
