//! `SingleAwaiterLock<T>`, the state machine behind [`crate::ValueTask`].
//!
//! Grounded on `cc_task_locks.h`'s `Single_Awaitable_Task_lock<T>`: at most
//! one awaiter may ever register over the lock's lifetime, enforced by a
//! CAS-guarded state transition rather than a queue.

use crate::error::{CapturedPanic, TaskPanic};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Condvar, Mutex, OnceLock};
use std::task::Waker;
use tracing::trace;

const EMPTY: u8 = 0;
const AWAITING: u8 = 1;
const COMPLETED: u8 = 2;

pub enum AddAwaiterOutcome {
    /// No awaiter existed yet; `waker` was stored and will be woken on
    /// completion (or has already completed by the time this returns, in
    /// which case the caller should re-check `is_completed`).
    Registered,
    /// The lock had already completed before registration; the stored
    /// waker was discarded (the caller already has the result path).
    AlreadyComplete,
    /// Some other awaiter already registered.
    DoubleAwait,
}

pub struct SingleAwaiterLock<T> {
    state: AtomicU8,
    value: UnsafeCell<Option<T>>,
    failure: OnceLock<CapturedPanic>,
    waker: UnsafeCell<Option<Waker>>,
    park_lock: Mutex<()>,
    park_cvar: Condvar,
}

unsafe impl<T: Send> Send for SingleAwaiterLock<T> {}
unsafe impl<T: Send> Sync for SingleAwaiterLock<T> {}

impl<T> SingleAwaiterLock<T> {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(None),
            failure: OnceLock::new(),
            waker: UnsafeCell::new(None),
            park_lock: Mutex::new(()),
            park_cvar: Condvar::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state.load(Ordering::Acquire) == COMPLETED
    }

    pub fn add_awaiter(&self, waker: Waker) -> AddAwaiterOutcome {
        loop {
            match self.state.load(Ordering::Acquire) {
                EMPTY => {
                    unsafe { *self.waker.get() = Some(waker.clone()) };
                    if self
                        .state
                        .compare_exchange(EMPTY, AWAITING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return AddAwaiterOutcome::Registered;
                    }
                    // Lost the race to a concurrent completion; retry and
                    // observe COMPLETED on the next iteration.
                }
                AWAITING => return AddAwaiterOutcome::DoubleAwait,
                COMPLETED => return AddAwaiterOutcome::AlreadyComplete,
                _ => unreachable!("invalid single-awaiter state"),
            }
        }
    }

    pub fn complete_ok(&self, value: T) {
        unsafe { *self.value.get() = Some(value) };
        self.finish();
    }

    pub fn complete_err(&self, panic: TaskPanic) {
        let _ = self.failure.set(CapturedPanic::capture(panic));
        self.finish();
    }

    fn finish(&self) {
        let previous = self.state.swap(COMPLETED, Ordering::AcqRel);
        let woke = previous == AWAITING;
        if woke {
            if let Some(waker) = unsafe { (*self.waker.get()).take() } {
                waker.wake();
            }
        }
        {
            let _guard = self.park_lock.lock().unwrap();
            self.park_cvar.notify_all();
        }
        trace!(woke, "single-awaiter lock finished");
    }

    /// Blocks the calling thread until the lock completes. Does not go
    /// through `add_awaiter` and so never competes for the single-awaiter
    /// slot — a blocking `wait()` and one `.await`er may coexist.
    pub fn wait_blocking(&self) {
        if self.is_completed() {
            return;
        }
        let guard = self.park_lock.lock().unwrap();
        let _unused = self.park_cvar.wait_while(guard, |_| !self.is_completed()).unwrap();
    }

    pub fn take_value(&self) -> Option<T> {
        debug_assert!(self.is_completed());
        unsafe { (*self.value.get()).take() }
    }

    pub fn take_failure(&self) -> Option<&CapturedPanic> {
        self.failure.get()
    }
}

impl<T> Default for SingleAwaiterLock<T> {
    fn default() -> Self {
        Self::new()
    }
}
