//! Bounded single-producer / multi-consumer ring buffer.
//!
//! One thread (the owning worker) calls `write`; any number of threads may
//! call `read` concurrently (stealing workers). `write` is wait-free; `read`
//! is lock-free via a CAS loop on a shared read position.
//!
//! Slot reuse is arbitrated by a per-slot sequence stamp (the scheme behind
//! `crossbeam::queue::ArrayQueue`, itself from Dmitry Vyukov's bounded MPMC
//! design) rather than by comparing the two position counters alone: a
//! consumer may only copy a slot's value out after observing (via an
//! `Acquire` load of that slot's stamp) that the producer's write to it has
//! happened-before, and the producer may only reuse a slot after observing
//! that the consumer who last read it has finished and bumped the stamp
//! forward. Two bare indices can't express "this consumer is still mid-read
//! of a slot the producer now wants back" — the stamp can.

use crossbeam_utils::{Backoff, CachePadded};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Slot<T> {
    /// Equal to the slot's absolute position while writable, position + 1
    /// once written and readable, position + capacity once drained and
    /// writable again for the next lap.
    stamp: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

unsafe impl<T: Send> Sync for Slot<T> {}

/// Fixed-capacity ring buffer with one producer and many consumers.
///
/// `head`/`tail` are monotonically increasing positions (never wrapped);
/// a slot's index is `position % capacity`. All `capacity` slots are usable
/// — no slot is sacrificed to disambiguate full from empty, since each
/// slot's own stamp already encodes that.
pub struct SpmcRing<T> {
    slots: Box<[Slot<T>]>,
    capacity: usize,
    tail: CachePadded<AtomicUsize>,
    head: CachePadded<AtomicUsize>,
}

impl<T> SpmcRing<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "SpmcRing capacity must be at least 2");
        let slots = (0..capacity)
            .map(|i| Slot { stamp: AtomicUsize::new(i), value: UnsafeCell::new(MaybeUninit::uninit()) })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            capacity,
            tail: CachePadded::new(AtomicUsize::new(0)),
            head: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Attempts to push `value`. Returns `Err(value)` if the ring is full.
    ///
    /// Must only be called from the single producer thread.
    pub fn write(&self, value: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let slot = &self.slots[tail % self.capacity];
        // Writable only once the slot's stamp matches this exact position:
        // either its first lap (initialized to its own index) or a later
        // lap where the previous consumer has bumped it to `tail`.
        if slot.stamp.load(Ordering::Acquire) != tail {
            return Err(value);
        }
        unsafe {
            (*slot.value.get()).write(value);
        }
        slot.stamp.store(tail + 1, Ordering::Release);
        self.tail.store(tail + 1, Ordering::Release);
        Ok(())
    }

    /// Attempts to pop the oldest value. Returns `None` if the ring is empty.
    ///
    /// Safe to call from any number of concurrent consumer threads.
    pub fn read(&self) -> Option<T> {
        let backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Relaxed);
            let slot = &self.slots[head % self.capacity];
            let stamp = slot.stamp.load(Ordering::Acquire);

            if stamp == head + 1 {
                // Readable: the producer's write happened-before this load.
                // Claim the position before touching the value so no other
                // consumer can read the same slot concurrently.
                if self
                    .head
                    .compare_exchange_weak(head, head + 1, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    let value = unsafe { (*slot.value.get()).assume_init_read() };
                    // Hand the slot back to the producer only now, after the
                    // value has been fully copied out.
                    slot.stamp.store(head + self.capacity, Ordering::Release);
                    return Some(value);
                }
                backoff.spin();
            } else if stamp == head {
                // Producer hasn't written this position yet: genuinely empty.
                return None;
            } else {
                // Another consumer already claimed this position (or is
                // mid-claim); retry against whatever `head` is now.
                backoff.spin();
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

unsafe impl<T: Send> Send for SpmcRing<T> {}
unsafe impl<T: Send> Sync for SpmcRing<T> {}

impl<T> Drop for SpmcRing<T> {
    fn drop(&mut self) {
        let mut pos = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        while pos != tail {
            unsafe {
                (*self.slots[pos % self.capacity].value.get()).as_mut_ptr().drop_in_place();
            }
            pos += 1;
        }
    }
}
