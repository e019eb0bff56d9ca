//! The generic job driver shared by every task kind.
//!
//! A task's typed `Lock` is never touched by the job itself: `spawn` wraps
//! the user future so that it writes its own result into the lock and calls
//! `complete()` when it finishes, then boxes the wrapped future as an opaque
//! `dyn Future<Output = ()> + Send`. `JobInner` only knows how to poll that
//! boxed future and how to reschedule itself through a `Scheduler` when
//! woken — it is deliberately ignorant of `Task`/`ValueTask`/`Generator`.
//!
//! The scheduling state machine (`IDLE` / `SCHEDULED` / `RUNNING` /
//! `RUNNING_AND_NOTIFIED` / `COMPLETE`) is the standard lock-free technique
//! used by async executors (async-task, tokio) to guarantee a job is never
//! polled concurrently from two threads and is never lost when a wake
//! arrives mid-poll.

use corowork_pool::{Job as PoolJob, Runnable, Scheduler};
use std::cell::UnsafeCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

const IDLE: u8 = 0;
const SCHEDULED: u8 = 1;
const RUNNING: u8 = 2;
const RUNNING_AND_NOTIFIED: u8 = 3;
const COMPLETE: u8 = 4;

pub(crate) type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

pub(crate) struct JobInner {
    state: AtomicU8,
    // Exclusive access is guaranteed by the state machine: only the thread
    // that wins the IDLE/SCHEDULED -> RUNNING transition may touch this.
    future: UnsafeCell<Option<BoxedFuture>>,
    scheduler: Arc<dyn Scheduler>,
}

unsafe impl Send for JobInner {}
unsafe impl Sync for JobInner {}

impl JobInner {
    fn new(future: BoxedFuture, scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(SCHEDULED),
            future: UnsafeCell::new(Some(future)),
            scheduler,
        })
    }

    fn as_pool_job(self: &Arc<Self>) -> PoolJob {
        Arc::clone(self) as PoolJob
    }
}

/// Builds a job from a future and submits it to `scheduler` for its first
/// poll. Returns nothing: the future itself is responsible for publishing
/// its result through whatever `Lock` it closed over.
pub(crate) fn spawn_on(future: BoxedFuture, scheduler: Arc<dyn Scheduler>) {
    let job = JobInner::new(future, Arc::clone(&scheduler));
    let pool_job = job.as_pool_job();
    scheduler.on_task_submitted(pool_job);
}

impl Runnable for JobInner {
    fn run(self: Arc<Self>) {
        // Win the right to poll: SCHEDULED -> RUNNING. Any other state means
        // this call is stale (shouldn't happen under normal scheduling) or
        // the job already completed; either way there is nothing to do.
        if self
            .state
            .compare_exchange(SCHEDULED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let waker = Waker::from(Arc::clone(&self));
        let mut cx = Context::from_waker(&waker);

        let poll_result = {
            let slot = unsafe { &mut *self.future.get() };
            match slot {
                Some(fut) => fut.as_mut().poll(&mut cx),
                None => Poll::Ready(()),
            }
        };

        match poll_result {
            Poll::Ready(()) => {
                unsafe { *self.future.get() = None };
                self.state.store(COMPLETE, Ordering::Release);
            }
            Poll::Pending => {
                match self.state.compare_exchange(
                    RUNNING,
                    IDLE,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {}
                    Err(_) => {
                        // A wake raced us while we were polling
                        // (RUNNING_AND_NOTIFIED): reschedule immediately,
                        // there may be new readiness we haven't observed.
                        self.state.store(SCHEDULED, Ordering::Release);
                        self.scheduler.schedule(self.as_pool_job());
                    }
                }
            }
        }
    }
}

impl Wake for JobInner {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        loop {
            match self.state.load(Ordering::Acquire) {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, SCHEDULED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.scheduler.schedule(self.as_pool_job());
                        return;
                    }
                    // lost the race, state changed underneath us: retry
                }
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(
                            RUNNING,
                            RUNNING_AND_NOTIFIED,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        return;
                    }
                }
                SCHEDULED | RUNNING_AND_NOTIFIED | COMPLETE => return,
                _ => unreachable!("invalid job state"),
            }
        }
    }
}
