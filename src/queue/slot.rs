// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A single slot cell: one cache line, one item, written once and read once.
//!
//! # Synchronization Protocol
//!
//! Enqueue: `put` stores the boxed item's raw pointer with `Release`.
//! Dequeue: `spin_until_filled` busy-waits, loading with `Acquire`, until the
//! pointer is non-null, then reconstitutes the `Box<T>`.
//!
//! The null pointer is the `EMPTY` sentinel (spec: "the source uses the null
//! pointer"). A `Box::into_raw` pointer for any `T` is never null, so a
//! filled slot can never be mistaken for an empty one.

use crate::config::CACHE_LINE_SIZE;
use std::sync::atomic::{AtomicPtr, Ordering};

/// One cache-line-aligned slot. Single-writer/single-reader by construction:
/// only the enqueuer whose ticket maps here ever calls `put`, and only the
/// dequeuer whose ticket maps here ever calls `take`.
#[repr(align(64))]
pub struct Slot<T> {
    data: AtomicPtr<T>,
}

const _: () = assert!(CACHE_LINE_SIZE == 64, "Slot<T> alignment must track CACHE_LINE_SIZE");

impl<T> Slot<T> {
    pub const fn empty() -> Self {
        Self {
            data: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    /// Publish `item` into this slot. Must be called at most once per slot.
    pub fn put(&self, item: T) {
        let raw = Box::into_raw(Box::new(item));
        self.data.store(raw, Ordering::Release);
    }

    /// Spin until the slot is filled, then take ownership of the item.
    /// Must be called at most once per slot, and only after `put` has been
    /// (or will eventually be) called by the matching enqueuer.
    ///
    /// Resets the cell back to the `EMPTY`/null sentinel as it takes, so a
    /// drained slot reads as empty to `Drop` (and to anything else that
    /// might inspect it) rather than leaving a dangling pointer behind.
    pub fn spin_take(&self) -> T {
        loop {
            let raw = self.data.swap(std::ptr::null_mut(), Ordering::AcqRel);
            if !raw.is_null() {
                // SAFETY: non-null `raw` was produced by `Box::into_raw` in
                // `put`, and this slot is read exactly once (spec SEG-2), so
                // reconstructing the box here does not double-free.
                return unsafe { *Box::from_raw(raw) };
            }
            std::hint::spin_loop();
        }
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Drop for Slot<T> {
    /// A slot that was `put()` but never `get()`-drained still holds a live
    /// `Box::into_raw` pointer when its owning segment is freed (e.g. a
    /// queue dropped with items enqueued but undequeued). Reclaim it here so
    /// the boxed `T`'s destructor runs instead of leaking.
    fn drop(&mut self) {
        let raw = *self.data.get_mut();
        if !raw.is_null() {
            // SAFETY: non-null `raw` was produced by `Box::into_raw` in
            // `put` and this slot is being dropped exactly once, so
            // reconstructing and dropping the box here does not double-free.
            unsafe { drop(Box::from_raw(raw)) };
        }
    }
}
