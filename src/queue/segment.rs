// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Segment nodes: the lazily-grown singly-linked list that backs the queue's
//! slot storage.
//!
//! Each segment holds `S` slots (`QueueConfig::segment_capacity`) and an `id`
//! that is its ordinal position in the list (`id = 0` for the first segment,
//! the `k`-th successor has `id = k` — invariant SEG-1). A segment is
//! allocated lazily, the first time some thread's ticket crosses past the end
//! of the list, and is installed with a single winning CAS on `next`
//! (`update`, below); losers free their speculative allocation.

use crate::queue::slot::Slot;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

/// One node in the segment list.
///
/// `next` is over-aligned to a cache line so that a thread following the
/// list does not false-share the pointer with the `id` field or with the
/// slot array that immediately follows it in the allocation.
#[repr(align(64))]
pub struct Segment<T> {
    pub id: usize,
    next: AtomicPtr<Segment<T>>,
    slots: Box<[Slot<T>]>,
}

impl<T> Segment<T> {
    /// Allocate a fresh, all-`EMPTY` segment with the given id and capacity.
    pub fn new(id: usize, capacity: usize) -> Box<Self> {
        let slots: Box<[Slot<T>]> = (0..capacity)
            .map(|_| Slot::empty())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Box::new(Self {
            id,
            next: AtomicPtr::new(std::ptr::null_mut()),
            slots,
        })
    }

    #[inline]
    pub fn slot(&self, index: usize) -> &Slot<T> {
        &self.slots[index]
    }

    #[inline]
    pub(crate) fn next_ptr(&self) -> *mut Segment<T> {
        self.next.load(Ordering::Acquire)
    }
}

/// Walk `node` forward until its id equals `to`, allocating and CAS-installing
/// new segments as needed (spec.md §4.2 "Walk-and-extend").
///
/// `capacity` is the per-segment slot count used for any newly allocated
/// segment. `winner` is set to `true` by whichever call wins the CAS that
/// installs a segment the list didn't have yet; it is never cleared here —
/// clearing/consuming it is the caller's responsibility (spec.md §4.6, §9).
///
/// # Safety
/// `node` must be a valid, currently-hazard-protected pointer to a segment
/// with `id <= to` that is reachable from the queue's head.
pub unsafe fn update<T>(
    mut node: *mut Segment<T>,
    to: usize,
    capacity: usize,
    winner: &AtomicBool,
) -> *mut Segment<T> {
    loop {
        let id = (*node).id;
        if id >= to {
            return node;
        }

        let mut next = (*node).next_ptr();
        if next.is_null() {
            let candidate = Box::into_raw(Segment::new(id + 1, capacity));
            match (*node).next.compare_exchange(
                std::ptr::null_mut(),
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    winner.store(true, Ordering::Relaxed);
                    next = candidate;
                }
                Err(actual) => {
                    // SAFETY: we just allocated `candidate` and nobody else
                    // observed it (the CAS failed before publishing it).
                    drop(Box::from_raw(candidate));
                    next = actual;
                }
            }
        }

        node = next;
    }
}
