//! Atomic Slot - a compare-and-set cell holding one node pointer.
//!
//! Every link in the exchange (bucket heads, book heads, `next` pointers)
//! is an `AtomicSlot`. It wraps a native atomic pointer from
//! `crossbeam::epoch`, so readers traverse under a pinned guard and
//! unlinked nodes are reclaimed only once no guard can still observe them.
//! That also rules out ABA on reused node addresses.
//!
//! The lowest tag bit of a `next` slot is the deletion mark of the node
//! that owns the slot. Head slots are never marked.

use std::fmt;
use std::sync::atomic::Ordering;

use crossbeam::epoch::{Atomic, Guard, Shared};

/// Tag value set on a node's `next` pointer once the node is removed.
pub const MARKED: usize = 1;

/// A single-writer-wins cell wrapping one node pointer.
pub struct AtomicSlot<T> {
    ptr: Atomic<T>,
}

impl<T> AtomicSlot<T> {
    /// Create an empty slot (null pointer, no tag).
    #[inline]
    pub fn null() -> Self {
        Self { ptr: Atomic::null() }
    }

    /// Read the current pointer, tag included.
    #[inline]
    pub fn get<'g>(&self, guard: &'g Guard) -> Shared<'g, T> {
        self.ptr.load(Ordering::Acquire, guard)
    }

    /// Replace the pointer iff it is still identical to `expected`
    /// (address and tag). Returns whether the swap happened.
    #[inline]
    pub fn compare_and_set<'g>(
        &self,
        expected: Shared<'g, T>,
        new: Shared<'g, T>,
        guard: &'g Guard,
    ) -> bool {
        self.ptr
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire, guard)
            .is_ok()
    }

    /// Unconditionally overwrite the pointer.
    ///
    /// Only valid on a slot no other thread can reach yet, e.g. the `next`
    /// of a node that has not been published. Publication happens through
    /// a later `compare_and_set`, which releases this write.
    #[inline]
    pub fn store(&self, new: Shared<'_, T>) {
        self.ptr.store(new, Ordering::Relaxed);
    }

    /// Set the deletion mark, returning the value seen just before.
    ///
    /// A single atomic `fetch_or`: it cannot fail, and once set the mark
    /// freezes the slot because every CAS expects an unmarked pointer.
    #[inline]
    pub fn mark<'g>(&self, guard: &'g Guard) -> Shared<'g, T> {
        self.ptr.fetch_or(MARKED, Ordering::AcqRel, guard)
    }
}

/// Whether a loaded link carries the deletion mark.
#[inline]
pub fn is_marked<T>(ptr: Shared<'_, T>) -> bool {
    ptr.tag() == MARKED
}

impl<T> Default for AtomicSlot<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for AtomicSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = crossbeam::epoch::pin();
        let current = self.get(&guard);
        f.debug_struct("AtomicSlot")
            .field("ptr", &current.as_raw())
            .field("marked", &is_marked(current))
            .finish()
    }
}
