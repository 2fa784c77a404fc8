use std::fmt;
use std::ptr::NonNull;

use crate::node::{Linked, Links};
use crate::queue::{Consumer, Queue};

/// A boxed node carrying one value, for callers without an intrusive type.
pub struct Entry<V> {
    links: Links<Entry<V>>,
    value: V,
}

/// A queue of plain values.
pub type ValueQueue<V> = Queue<Entry<V>>;

impl<V> Entry<V> {
    pub fn new(value: V) -> Box<Self> {
        Box::new(Self {
            links: Links::new(),
            value,
        })
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    /// Replaces the carried value, so that a popped entry can be pushed again
    /// without reallocating.
    pub fn replace(&mut self, value: V) -> V {
        std::mem::replace(&mut self.value, value)
    }

    pub fn into_inner(self: Box<Self>) -> V {
        let Self { links: _, value } = *self;
        value
    }
}

unsafe impl<V> Linked for Entry<V> {
    type Handle = Box<Entry<V>>;

    fn into_ptr(handle: Box<Entry<V>>) -> NonNull<Entry<V>> {
        NonNull::from(Box::leak(handle))
    }

    unsafe fn from_ptr(ptr: NonNull<Entry<V>>) -> Box<Entry<V>> {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Entry<V>>) -> NonNull<Links<Entry<V>>> {
        unsafe { NonNull::new_unchecked(&raw mut (*ptr.as_ptr()).links) }
    }
}

impl<V: fmt::Debug> fmt::Debug for Entry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Entry").field(&self.value).finish()
    }
}

impl<V> Queue<Entry<V>> {
    /// Allocates an [`Entry`] for `value` and pushes it.
    ///
    /// Returns `true` if the queue was empty right before this call.
    pub fn push_value(&self, value: V) -> bool {
        self.push(Entry::new(value))
    }
}

impl<V> Consumer<'_, Entry<V>> {
    /// Pops the oldest entry and unwraps its value.
    pub fn pop_value(&mut self) -> Option<V> {
        self.pop().map(Entry::into_inner)
    }
}
