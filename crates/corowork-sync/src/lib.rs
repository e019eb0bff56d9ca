//! Suspending synchronization primitives: [`AsyncMutex`] and [`AsyncCondVar`].
//!
//! These sit above `corowork-queue`'s lock-free [`corowork_queue::UnboundedMpmcQueue`]
//! rather than a blocking `std::sync` primitive — acquiring them suspends
//! the awaiting task (registers a waker and returns `Pending`) instead of
//! parking a worker thread, which matters because a blocked worker thread
//! in `corowork-pool`'s fixed-size pool is a thread that cannot run anyone
//! else's work. Grounded on `cc_sync_utils.h`'s `AsyncMutex`/`AsyncMutexLock`.

mod condvar;
mod mutex;

pub use condvar::AsyncCondVar;
pub use mutex::{AsyncMutex, AsyncMutexGuard, LockFuture};
