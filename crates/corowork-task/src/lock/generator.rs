//! `GeneratorLock<T>`, the state machine behind [`crate::Generator`].
//!
//! Grounded on `cc_task_locks.h`'s `Generator_Lock_t<T>`: a queue of
//! consumer continuations, a single producer-waiter slot, and `wake()`/
//! `complete()` semantics. Unlike the lock-free queue and ring, this lock
//! guards its small amount of shared state behind one `parking_lot::Mutex`
//! rather than independent CAS'd fields — producer/consumer handoff here is
//! not a hot path the way the core queue is, and a short-lived lock keeps
//! the race-handling obviously correct.

use crate::error::{CapturedPanic, TaskPanic};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::Waker;
use tracing::trace;

/// `None` until the producer fulfills it; `Some(None)` is the terminal
/// sentinel meaning the generator completed with no further value.
pub type ConsumerSlot<T> = Arc<Mutex<Option<Option<T>>>>;

struct ConsumerWaiter<T> {
    slot: ConsumerSlot<T>,
    waker: Waker,
}

struct State<T> {
    consumers: VecDeque<ConsumerWaiter<T>>,
    producer_waker: Option<Waker>,
}

pub struct GeneratorLock<T> {
    completed: AtomicBool,
    failure: OnceLock<CapturedPanic>,
    state: Mutex<State<T>>,
}

impl<T> GeneratorLock<T> {
    pub fn new() -> Self {
        Self {
            completed: AtomicBool::new(false),
            failure: OnceLock::new(),
            state: Mutex::new(State { consumers: VecDeque::new(), producer_waker: None }),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn take_failure(&self) -> Option<&CapturedPanic> {
        self.failure.get()
    }

    /// Registers a consumer continuation, then rouses the producer. Only
    /// called when `is_completed()` was false at the time of the check in
    /// the stream adapter; still races against completion here, handled by
    /// fulfilling the slot directly if completion already drained past us.
    pub fn register_consumer(&self, waker: Waker) -> ConsumerSlot<T> {
        let slot: ConsumerSlot<T> = Arc::new(Mutex::new(None));
        {
            let mut state = self.state.lock();
            state.consumers.push_back(ConsumerWaiter { slot: Arc::clone(&slot), waker: waker.clone() });
        }
        self.wake_producer();
        if self.is_completed() {
            let mut filled = slot.lock();
            if filled.is_none() {
                *filled = Some(None);
                drop(filled);
                waker.wake();
            }
        }
        slot
    }

    /// Wakes the producer if one is parked waiting for a consumer. Never
    /// drains the consumer queue itself — that only happens in
    /// `complete()`, per the "drain only on completion" resolution.
    fn wake_producer(&self) {
        let waker = { self.state.lock().producer_waker.take() };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Attempts to hand `value` off to a waiting consumer immediately.
    /// `Ok(())` means the producer may continue without suspending; `Err`
    /// returns the value back so the caller can register and suspend.
    pub fn try_yield(&self, value: T) -> Result<(), T> {
        let consumer = { self.state.lock().consumers.pop_front() };
        match consumer {
            Some(consumer) => {
                *consumer.slot.lock() = Some(Some(value));
                consumer.waker.wake();
                Ok(())
            }
            None => Err(value),
        }
    }

    /// Parks the producer's own waker until a consumer arrives.
    pub fn register_producer(&self, waker: Waker) {
        self.state.lock().producer_waker = Some(waker);
    }

    pub fn complete_ok(&self) {
        self.finish();
    }

    pub fn complete_err(&self, panic: TaskPanic) {
        let _ = self.failure.set(CapturedPanic::capture(panic));
        self.finish();
    }

    fn finish(&self) {
        self.completed.store(true, Ordering::Release);
        let drained: Vec<ConsumerWaiter<T>> = self.state.lock().consumers.drain(..).collect();
        trace!(drained = drained.len(), "generator lock finished");
        for consumer in drained {
            *consumer.slot.lock() = Some(None);
            consumer.waker.wake();
        }
    }
}

impl<T> Default for GeneratorLock<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool as StdAtomicBool;
    use std::task::Wake;

    struct Flag(StdAtomicBool);
    impl Wake for Flag {
        fn wake(self: Arc<Self>) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn immediate_handoff_when_consumer_already_waiting() {
        let lock = GeneratorLock::<i32>::new();
        let flag = Arc::new(Flag(StdAtomicBool::new(false)));
        let slot = lock.register_consumer(Waker::from(Arc::clone(&flag)));
        assert!(lock.try_yield(5).is_ok());
        assert!(flag.0.load(Ordering::SeqCst));
        assert_eq!(*slot.lock(), Some(Some(5)));
    }

    #[test]
    fn yield_without_consumer_returns_value_back() {
        let lock = GeneratorLock::<i32>::new();
        assert_eq!(lock.try_yield(5), Err(5));
    }

    #[test]
    fn completion_drains_waiting_consumers_with_none() {
        let lock = GeneratorLock::<i32>::new();
        let flag = Arc::new(Flag(StdAtomicBool::new(false)));
        let slot = lock.register_consumer(Waker::from(Arc::clone(&flag)));
        lock.complete_ok();
        assert!(flag.0.load(Ordering::SeqCst));
        assert_eq!(*slot.lock(), Some(None));
    }

    #[test]
    fn registration_after_completion_is_fulfilled_directly() {
        let lock = GeneratorLock::<i32>::new();
        lock.complete_ok();
        let flag = Arc::new(Flag(StdAtomicBool::new(false)));
        let slot = lock.register_consumer(Waker::from(Arc::clone(&flag)));
        assert!(flag.0.load(Ordering::SeqCst));
        assert_eq!(*slot.lock(), Some(None));
    }
}
