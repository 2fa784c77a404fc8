use std::fmt;
use std::marker::PhantomPinned;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};

/// A type that can be linked into a [`Queue`](crate::Queue).
///
/// # Safety
///
/// - [`into_ptr`](Self::into_ptr) and [`from_ptr`](Self::from_ptr) must be
///   inverses, and the pointee must not move or be freed while the queue holds
///   the pointer.
/// - [`links`](Self::links) must return the [`Links`] embedded in the
///   pointee, and it must not be used for anything else while linked.
pub unsafe trait Linked: Sized {
    /// The owning handle submitted to and returned from the queue.
    type Handle;

    fn into_ptr(handle: Self::Handle) -> NonNull<Self>;

    /// # Safety
    ///
    /// `ptr` must have been returned from [`into_ptr`](Self::into_ptr) and
    /// must not be converted back more than once.
    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle;

    /// # Safety
    ///
    /// `ptr` must point to a live value of `Self`.
    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<Self>>;
}

/// The forward link embedded in every queued node.
pub struct Links<T> {
    next: AtomicPtr<T>,
    // Links must stay `!Unpin` so that they never receive `noalias`.
    _pin: PhantomPinned,
}

impl<T> Links<T> {
    pub const fn new() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            _pin: PhantomPinned,
        }
    }

    pub(crate) fn next(&self) -> Option<NonNull<T>> {
        NonNull::new(self.next.load(Ordering::Acquire))
    }

    pub(crate) fn set_next(&self, node: NonNull<T>) {
        self.next.store(node.as_ptr(), Ordering::Release);
    }

    /// Only valid once no producer can still write this slot.
    pub(crate) fn unlink(&self) {
        self.next.store(ptr::null_mut(), Ordering::Relaxed);
    }

    pub(crate) fn is_unlinked(&self) -> bool {
        self.next.load(Ordering::Relaxed).is_null()
    }
}

impl<T> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("next", &self.next.load(Ordering::Relaxed))
            .finish()
    }
}

/// # Safety
///
/// See [`Linked::links`].
pub(crate) unsafe fn links<'a, T: Linked>(ptr: NonNull<T>) -> &'a Links<T> {
    unsafe { T::links(ptr).as_ref() }
}
