//! Bounded SPSC ring.
//!
//! Two-index design: monotonically increasing `head` (producer) and `tail`
//! (consumer) mapped onto a power-of-two ring by masking. Each side keeps a
//! cached copy of the other side's index on its own handle so the hot path
//! touches a shared cache line only when the cached view runs out.
//!
//! Exactly one producer and one consumer exist per ring; the handles are
//! `Send` but not `Clone`, so single-threaded access per side is enforced
//! by the type system rather than by locks.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::{PopError, PushError};

struct Inner<T> {
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    /// Next slot the producer will write. Only the producer stores.
    head: CachePadded<AtomicUsize>,
    /// Next slot the consumer will read. Only the consumer stores.
    tail: CachePadded<AtomicUsize>,
    closed: AtomicBool,
}

// SAFETY: slots are only touched by the producer between reserving an index
// and publishing it via `head`, and by the consumer between observing a
// published index and releasing it via `tail`. The Release/Acquire pairs on
// `head` and `tail` order the slot accesses.
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // Both handles are gone; plain loads are sufficient.
        let head = self.head.load(Ordering::Relaxed);
        let mut tail = self.tail.load(Ordering::Relaxed);
        while tail != head {
            let slot = &self.buf[tail & self.mask];
            unsafe { (*slot.get()).assume_init_drop() };
            tail = tail.wrapping_add(1);
        }
    }
}

/// Producing half of a bounded SPSC ring.
pub struct Producer<T> {
    inner: Arc<Inner<T>>,
    /// Producer-local copy of `head`; authoritative between pushes.
    head: usize,
    /// Last observed consumer position.
    tail_cache: usize,
}

/// Consuming half of a bounded SPSC ring.
pub struct Consumer<T> {
    inner: Arc<Inner<T>>,
    /// Consumer-local copy of `tail`; authoritative between pops.
    tail: usize,
    /// Last observed producer position.
    head_cache: usize,
}

/// Creates a bounded SPSC ring holding up to `capacity` elements.
///
/// The capacity is rounded up to the next power of two. Panics if zero.
pub fn spsc<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(capacity > 0, "spsc capacity must be non-zero");
    let capacity = capacity.next_power_of_two();
    let buf = (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let inner = Arc::new(Inner {
        buf,
        mask: capacity - 1,
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
        closed: AtomicBool::new(false),
    });
    let producer = Producer {
        inner: Arc::clone(&inner),
        head: 0,
        tail_cache: 0,
    };
    let consumer = Consumer {
        inner,
        tail: 0,
        head_cache: 0,
    };
    (producer, consumer)
}

impl<T> Producer<T> {
    /// Enqueues `value`, or returns it inside the error when the ring is
    /// full or the consumer is gone.
    pub fn push(&mut self, value: T) -> Result<(), PushError<T>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(PushError::Closed(value));
        }
        let capacity = self.inner.buf.len();
        if self.head.wrapping_sub(self.tail_cache) == capacity {
            self.tail_cache = self.inner.tail.load(Ordering::Acquire);
            if self.head.wrapping_sub(self.tail_cache) == capacity {
                return Err(PushError::Full(value));
            }
        }
        let slot = &self.inner.buf[self.head & self.inner.mask];
        unsafe { (*slot.get()).write(value) };
        self.head = self.head.wrapping_add(1);
        self.inner.head.store(self.head, Ordering::Release);
        Ok(())
    }

    /// Number of elements currently enqueued.
    pub fn len(&self) -> usize {
        self.head
            .wrapping_sub(self.inner.tail.load(Ordering::Acquire))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.buf.len()
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}

impl<T> Consumer<T> {
    /// Dequeues the oldest element.
    ///
    /// Returns `Empty` while the producer is alive and the ring is drained,
    /// and `Closed` once it is drained for good.
    pub fn pop(&mut self) -> Result<T, PopError> {
        if self.tail == self.head_cache {
            self.head_cache = self.inner.head.load(Ordering::Acquire);
            if self.tail == self.head_cache {
                return if self.inner.closed.load(Ordering::Acquire) {
                    // Re-check: the producer may have pushed between the
                    // head load and the closed load.
                    self.head_cache = self.inner.head.load(Ordering::Acquire);
                    if self.tail == self.head_cache {
                        Err(PopError::Closed)
                    } else {
                        Ok(self.take())
                    }
                } else {
                    Err(PopError::Empty)
                };
            }
        }
        Ok(self.take())
    }

    fn take(&mut self) -> T {
        let slot = &self.inner.buf[self.tail & self.inner.mask];
        let value = unsafe { (*slot.get()).assume_init_read() };
        self.tail = self.tail.wrapping_add(1);
        self.inner.tail.store(self.tail, Ordering::Release);
        value
    }

    /// Number of elements currently enqueued.
    pub fn len(&self) -> usize {
        self.inner
            .head
            .load(Ordering::Acquire)
            .wrapping_sub(self.tail)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.buf.len()
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}
