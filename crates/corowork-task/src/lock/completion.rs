//! `CompletionLock<T>`, the state machine behind [`crate::Task`].
//!
//! Grounded on `cc_task_locks.h`'s `BaseLock`/`Task_lock<T>`: a completed
//! flag, a captured panic, and a queue of waiting continuations. `Task<T>`
//! is `Clone` and may be awaited from more than one place, so the completed
//! value is read by cloning rather than moved out once.

use crate::error::{CapturedPanic, TaskPanic};
use corowork_queue::UnboundedMpmcQueue;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, OnceLock};
use std::task::Waker;
use tracing::trace;

pub struct CompletionLock<T> {
    completed: AtomicBool,
    value: UnsafeCell<Option<T>>,
    failure: OnceLock<CapturedPanic>,
    waiters: UnboundedMpmcQueue<Waker>,
    park_lock: Mutex<()>,
    park_cvar: Condvar,
}

unsafe impl<T: Send> Send for CompletionLock<T> {}
unsafe impl<T: Send> Sync for CompletionLock<T> {}

impl<T> CompletionLock<T> {
    pub fn new() -> Self {
        Self {
            completed: AtomicBool::new(false),
            value: UnsafeCell::new(None),
            failure: OnceLock::new(),
            waiters: UnboundedMpmcQueue::new(),
            park_lock: Mutex::new(()),
            park_cvar: Condvar::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Registers `waker` to be woken on completion. If the lock is already
    /// complete, wakes inline instead of enqueuing. Races against a
    /// concurrent `complete()` are resolved by re-checking after the push
    /// and waking again if needed — a spurious extra wake is harmless since
    /// job rescheduling is idempotent.
    pub fn append_waker(&self, waker: Waker) {
        if self.is_completed() {
            waker.wake();
            return;
        }
        self.waiters.push(waker.clone());
        if self.is_completed() {
            waker.wake();
        }
    }

    /// Completes the lock with a successful value. Must be called at most
    /// once over the lock's lifetime.
    pub fn complete_ok(&self, value: T) {
        unsafe { *self.value.get() = Some(value) };
        self.finish();
    }

    /// Completes the lock with a captured panic payload instead of a value.
    pub fn complete_err(&self, panic: TaskPanic) {
        let _ = self.failure.set(CapturedPanic::capture(panic));
        self.finish();
    }

    fn finish(&self) {
        self.completed.store(true, Ordering::Release);
        {
            let _guard = self.park_lock.lock().unwrap();
            self.park_cvar.notify_all();
        }
        let mut woken = 0u32;
        while let Some(waker) = self.waiters.pop() {
            waker.wake();
            woken += 1;
        }
        trace!(woken, "completion lock finished");
    }

    /// Blocks the calling thread until the lock completes.
    pub fn wait_blocking(&self) {
        if self.is_completed() {
            return;
        }
        let guard = self.park_lock.lock().unwrap();
        let _unused = self
            .park_cvar
            .wait_while(guard, |_| !self.is_completed())
            .unwrap();
    }

    /// Returns the captured panic, if the task body panicked.
    pub fn take_failure(&self) -> Option<&CapturedPanic> {
        self.failure.get()
    }
}

impl<T: Clone> CompletionLock<T> {
    /// Returns a clone of the completed value. Panics (via an assertion,
    /// not a `RuntimeError`, since this is only ever called after
    /// `is_completed()` and the absence of a value is a library bug) if the
    /// lock completed successfully but never received a value.
    pub fn cloned_value(&self) -> Option<T> {
        debug_assert!(self.is_completed());
        unsafe { (*self.value.get()).clone() }
    }
}

impl<T> Default for CompletionLock<T> {
    fn default() -> Self {
        Self::new()
    }
}
