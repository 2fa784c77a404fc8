use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

use crate::node::{Linked, Links, links};

/// A lock-free, intrusive, multi-producer single-consumer FIFO queue.
///
/// Any number of threads may [`push`](Self::push) concurrently. Popping is
/// reserved to a single [`Consumer`] at a time.
pub struct Queue<T: Linked> {
    /// The most recently pushed node. Producers race on this.
    tail: CachePadded<AtomicPtr<T>>,
    /// The oldest node. Written by the consumer, and by the producer that
    /// finds the queue empty.
    head: CachePadded<AtomicPtr<T>>,
    has_consumer: CachePadded<AtomicBool>,
    marker: PhantomData<*const T::Handle>,
}

unsafe impl<T: Linked> Send for Queue<T> where T::Handle: Send {}
unsafe impl<T: Linked> Sync for Queue<T> where T::Handle: Send {}

impl<T: Linked> Queue<T> {
    pub const fn new() -> Self {
        Self {
            tail: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            head: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            has_consumer: CachePadded::new(AtomicBool::new(false)),
            marker: PhantomData,
        }
    }

    /// Appends a node to the end of the queue.
    ///
    /// Returns `true` if the queue was empty right before this call.
    pub fn push(&self, node: T::Handle) -> bool {
        let node = T::into_ptr(node);
        // SAFETY: The handle is owned by the queue from now on.
        let node_links = unsafe { links(node) };
        debug_assert!(node_links.is_unlinked(), "pushed a linked node");

        // `Release` publishes the node, `Acquire` grants access to `prev`.
        let prev = self.tail.swap(node.as_ptr(), Ordering::AcqRel);
        match NonNull::new(prev) {
            None => {
                self.head.store(node.as_ptr(), Ordering::Release);
                true
            },
            Some(prev) => {
                // SAFETY: `prev` cannot be detached until its link is written.
                unsafe { links(prev).set_next(node) };
                false
            },
        }
    }

    /// Reserves the right to pop, spinning while another consumer exists.
    pub fn consume(&self) -> Consumer<'_, T> {
        let backoff = Backoff::new();
        loop {
            if let Some(consumer) = self.try_consume() {
                return consumer;
            }
            backoff.snooze();
        }
    }

    /// Reserves the right to pop, or returns `None` if it is already taken.
    pub fn try_consume(&self) -> Option<Consumer<'_, T>> {
        self.has_consumer
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Consumer { q: self })
    }

    /// Detaches the oldest node, or returns `None` if no node is reachable.
    ///
    /// # Safety
    ///
    /// This must not be called concurrently with itself, with
    /// [`is_empty_unchecked`](Self::is_empty_unchecked), or while a
    /// [`Consumer`] exists on another thread.
    pub unsafe fn pop_unchecked(&self) -> Option<T::Handle> {
        let head = NonNull::new(self.head.load(Ordering::Acquire))?;
        // SAFETY: `head` stays alive until it is returned below.
        let head_links = unsafe { links(head) };

        let is_last = self
            .tail
            .compare_exchange(
                head.as_ptr(),
                ptr::null_mut(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if is_last {
            // A producer may have already republished `head` after the queue
            // became empty, in which case it must be kept.
            _ = self.head.compare_exchange(
                head.as_ptr(),
                ptr::null_mut(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        } else {
            let next = Self::wait_next(head_links);
            self.head.store(next.as_ptr(), Ordering::Release);
        }

        head_links.unlink();
        // SAFETY: No producer or consumer can reach `head` anymore.
        Some(unsafe { T::from_ptr(head) })
    }

    /// Whether `head` currently references no node.
    ///
    /// # Safety
    ///
    /// See [`pop_unchecked`](Self::pop_unchecked).
    pub unsafe fn is_empty_unchecked(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Waits for the producer that swapped `tail` behind `node` to link it.
    fn wait_next(node: &Links<T>) -> NonNull<T> {
        let backoff = Backoff::new();
        let mut rounds = 0usize;
        loop {
            if let Some(next) = node.next() {
                if rounds > 0 {
                    tracing::trace!("linked successor after waiting, rounds={rounds}");
                }
                return next;
            }
            rounds += 1;
            backoff.snooze();
        }
    }
}

impl<T: Linked> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Linked> Drop for Queue<T> {
    fn drop(&mut self) {
        let mut cur = NonNull::new(*self.head.get_mut());
        while let Some(node) = cur {
            // SAFETY: We have exclusive access, so every push has completed
            // and the chain from `head` is fully linked.
            unsafe {
                cur = links(node).next();
                drop(T::from_ptr(node));
            }
        }
    }
}

impl<T: Linked> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .field("has_consumer", &self.has_consumer.load(Ordering::Relaxed))
            .finish()
    }
}

/// The exclusive right to pop from a [`Queue`], released on drop.
pub struct Consumer<'q, T: Linked> {
    q: &'q Queue<T>,
}

impl<T: Linked> Consumer<'_, T> {
    /// Detaches the oldest node, or returns `None` if no node is reachable.
    ///
    /// This waits briefly if a producer is halfway through linking the
    /// successor of the oldest node.
    pub fn pop(&mut self) -> Option<T::Handle> {
        // SAFETY: `self` holds the consumer reservation.
        unsafe { self.q.pop_unchecked() }
    }

    /// Whether the queue looks empty. Advisory while producers are active.
    pub fn is_empty(&self) -> bool {
        // SAFETY: `is_empty_unchecked` only reads `head`, and popping
        // requires `&mut self`.
        unsafe { self.q.is_empty_unchecked() }
    }

    pub fn queue(&self) -> &Queue<T> {
        self.q
    }
}

impl<T: Linked> Iterator for Consumer<'_, T> {
    type Item = T::Handle;

    fn next(&mut self) -> Option<T::Handle> {
        self.pop()
    }
}

impl<T: Linked> Drop for Consumer<'_, T> {
    fn drop(&mut self) {
        self.q.has_consumer.store(false, Ordering::Release);
    }
}

impl<T: Linked> fmt::Debug for Consumer<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer").field("q", self.q).finish()
    }
}
