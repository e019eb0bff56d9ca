//! Lock-free unbounded multi-producer / multi-consumer queue.
//!
//! A Michael & Scott queue: a singly linked list with a sentinel head node,
//! `head`/`tail` each a `crossbeam_epoch::Atomic` pointer, reclaimed through
//! epoch-based garbage collection rather than reference counting or hazard
//! pointers. `push` always succeeds; `pop` returns `None` only when the
//! queue was observed empty.

use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};
use std::sync::atomic::{AtomicUsize, Ordering};

struct Node<T> {
    value: Option<T>,
    next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> Self {
        Self { value: None, next: Atomic::null() }
    }
}

/// An unbounded, lock-free multi-producer / multi-consumer queue.
///
/// `T` is required to be `Send` because values cross thread boundaries
/// through the queue by construction.
pub struct UnboundedMpmcQueue<T> {
    head: Atomic<Node<T>>,
    tail: Atomic<Node<T>>,
    len: AtomicUsize,
}

impl<T> Default for UnboundedMpmcQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UnboundedMpmcQueue<T> {
    pub fn new() -> Self {
        let sentinel = Owned::new(Node::sentinel());
        let guard = epoch::pin();
        let sentinel = sentinel.into_shared(&guard);
        Self {
            head: Atomic::from(sentinel),
            tail: Atomic::from(sentinel),
            len: AtomicUsize::new(0),
        }
    }

    /// Returns `true` if no element is currently observable. Racy against
    /// concurrent `push`/`pop`; meant for diagnostics, not synchronization.
    pub fn is_empty(&self) -> bool {
        self.len.load(Ordering::Acquire) == 0
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn push(&self, value: T) {
        let mut node = Owned::new(Node { value: Some(value), next: Atomic::null() });
        let guard = epoch::pin();
        loop {
            let tail = self.tail.load(Ordering::Acquire, &guard);
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Ordering::Acquire, &guard);
            if next.is_null() {
                match tail_ref.next.compare_exchange(
                    Shared::null(),
                    node,
                    Ordering::Release,
                    Ordering::Relaxed,
                    &guard,
                ) {
                    Ok(new) => {
                        let _ = self.tail.compare_exchange(
                            tail,
                            new,
                            Ordering::Release,
                            Ordering::Relaxed,
                            &guard,
                        );
                        self.len.fetch_add(1, Ordering::AcqRel);
                        return;
                    }
                    Err(e) => {
                        node = e.new;
                        continue;
                    }
                }
            } else {
                // Someone pushed but hasn't advanced tail yet; help them along.
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    &guard,
                );
            }
        }
    }

    pub fn pop(&self) -> Option<T> {
        let guard = epoch::pin();
        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            let tail = self.tail.load(Ordering::Acquire, &guard);
            let head_ref = unsafe { head.deref() };
            let next = head_ref.next.load(Ordering::Acquire, &guard);

            if head == tail {
                if next.is_null() {
                    return None;
                }
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    &guard,
                );
                continue;
            }

            let next_ref = unsafe { next.as_ref() }?;
            if self
                .head
                .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed, &guard)
                .is_ok()
            {
                self.len.fetch_sub(1, Ordering::AcqRel);
                // `next` becomes the new sentinel; its value is taken, the old
                // head node is unlinked and deferred for reclamation.
                let value = unsafe {
                    let next_mut = next.as_raw() as *mut Node<T>;
                    (*next_mut).value.take()
                };
                unsafe { guard.defer_destroy(head) };
                let _ = next_ref;
                return value;
            }
        }
    }
}

impl<T> Drop for UnboundedMpmcQueue<T> {
    fn drop(&mut self) {
        // No concurrent access is possible once we have `&mut self`; walk the
        // list and drop every remaining value, then free every node.
        unsafe {
            let guard = epoch::unprotected();
            let mut cur = self.head.load(Ordering::Relaxed, guard);
            while !cur.is_null() {
                let owned = cur.into_owned();
                let next = owned.next.load(Ordering::Relaxed, guard);
                drop(owned);
                cur = next;
            }
        }
    }
}

unsafe impl<T: Send> Send for UnboundedMpmcQueue<T> {}
unsafe impl<T: Send> Sync for UnboundedMpmcQueue<T> {}
