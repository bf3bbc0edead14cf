// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reclamation: the scan-and-free pass that advances the logical head of the
//! segment list past segments no longer referenced by any handle
//! (spec.md §4.7).
//!
//! Only the dequeuer that just won a segment-extension CAS runs this (its
//! `winner` flag is set), which amortises the scan over work that already
//! touches the tail. At most one reclamation pass runs at a time: the `-1`
//! sentinel on `Head::index` is a mutual-exclusion token, and a thread that
//! loses the CAS to take the reclaimer role simply returns — reclamation is
//! best-effort, never blocking.

use crate::queue::handle::{Registry, Side};
use crate::queue::segment::Segment;
use std::sync::atomic::{AtomicIsize, AtomicPtr, Ordering};

/// The queue's logical head: the oldest segment still possibly referenced,
/// and its id (or the sentinel `-1` while a reclamation pass holds the
/// reclaimer role).
pub struct Head<T> {
    pub(crate) node: AtomicPtr<Segment<T>>,
    pub(crate) index: AtomicIsize,
}

impl<T> Head<T> {
    pub fn new(initial: *mut Segment<T>) -> Self {
        Self {
            node: AtomicPtr::new(initial),
            index: AtomicIsize::new(0),
        }
    }
}

/// Shrink `to` to `hazard` if a published hazard references an older
/// segment than `to` (spec.md §4.7, the no-`phazard` branch of the source's
/// `check()`).
fn shrink_to_hazard<T>(hazard_cell: &AtomicPtr<Segment<T>>, to: *mut Segment<T>) -> *mut Segment<T> {
    let hazard = hazard_cell.load(Ordering::Acquire);
    if hazard.is_null() {
        return to;
    }
    // SAFETY: `hazard` is non-null and, by HAZ-1, references a segment that
    // has not yet been freed (we haven't freed anything below `to` yet).
    if unsafe { (*hazard).id } < unsafe { (*to).id } {
        hazard
    } else {
        to
    }
}

/// Shrink `to` to cover `node_cell`'s referenced segment, advancing
/// `node_cell` forward to `to` if it was trailing behind. Re-checks the
/// hazard after the CAS so a hazard published concurrently with the CAS is
/// never silently outrun (spec.md §4.7, the `phazard`-present branch of
/// `check()`).
fn shrink_to_node<T>(
    node_cell: &AtomicPtr<Segment<T>>,
    hazard_cell: &AtomicPtr<Segment<T>>,
    to: *mut Segment<T>,
) -> *mut Segment<T> {
    let node = node_cell.load(Ordering::Acquire);
    if unsafe { (*node).id } >= unsafe { (*to).id } {
        return to;
    }

    let observed = match node_cell.compare_exchange(node, to, Ordering::AcqRel, Ordering::Acquire)
    {
        Ok(_) => to,
        Err(actual) => actual,
    };

    // Full fence: must see any hazard published concurrently with the CAS
    // above before deciding whether `observed` is still trustworthy.
    std::sync::atomic::fence(Ordering::AcqRel);
    let hazard = hazard_cell.load(Ordering::Acquire);
    let candidate = if hazard.is_null() { observed } else { hazard };

    if unsafe { (*candidate).id } < unsafe { (*to).id } {
        candidate
    } else {
        to
    }
}

/// Run one reclamation pass, if the hysteresis and the reclaimer-role CAS
/// both allow it. `candidate` is the segment the caller (a dequeuer that
/// just extended the list) just operated on, and is the proposed new head.
pub fn cleanup<T>(
    head: &Head<T>,
    registry: &Registry<T>,
    hysteresis: usize,
    candidate: *mut Segment<T>,
) {
    let index = head.index.load(Ordering::Acquire);
    if index == -1 {
        return;
    }

    let candidate_id = unsafe { (*candidate).id } as isize;
    if candidate_id - index <= hysteresis as isize {
        return;
    }

    if head
        .index
        .compare_exchange(index, -1, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }

    let mut to = candidate;
    registry.for_each(|h| {
        to = shrink_to_hazard(&h.hazard, to);
        to = shrink_to_node(h.node_cell(Side::Enq), &h.hazard, to);
        to = shrink_to_node(h.node_cell(Side::Deq), &h.hazard, to);
    });

    let mut curr = head.node.load(Ordering::Acquire);
    while curr != to {
        // SAFETY: no registered handle's hazard or cached node references
        // any segment with id < `to`'s id (established by the scan above),
        // so every segment strictly between the old head and `to` is
        // unreachable from any other thread.
        let next = unsafe { (*curr).next_ptr() };
        unsafe { drop(Box::from_raw(curr)) };
        curr = next;
    }

    head.node.store(to, Ordering::Release);
    head.index
        .store(unsafe { (*to).id } as isize, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::segment::update;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn below_hysteresis_frees_nothing() {
        unsafe {
            let root = Box::into_raw(Segment::<u32>::new(0, 1));
            let head = Head::new(root);
            let registry: Registry<u32> = Registry::new(0);

            let winner = AtomicBool::new(false);
            let tail = update(root, 2, 1, &winner);

            cleanup(&head, &registry, 100, tail);
            assert_eq!(head.node.load(Ordering::Relaxed), root);
            assert_eq!(head.index.load(Ordering::Relaxed), 0);

            // free the chain manually
            let mut curr = root;
            while !curr.is_null() {
                let next = (*curr).next_ptr();
                drop(Box::from_raw(curr));
                curr = next;
            }
        }
    }

    #[test]
    fn no_registered_handles_frees_everything_below_candidate() {
        unsafe {
            let root = Box::into_raw(Segment::<u32>::new(0, 1));
            let head = Head::new(root);
            let registry: Registry<u32> = Registry::new(0);

            let winner = AtomicBool::new(false);
            let tail = update(root, 5, 1, &winner);

            cleanup(&head, &registry, 0, tail);
            assert_eq!(head.node.load(Ordering::Relaxed), tail);
            assert_eq!((*tail).id, 5);

            drop(Box::from_raw(tail));
        }
    }

    #[test]
    fn hazard_protects_its_segment_from_reclamation() {
        unsafe {
            let root = Box::into_raw(Segment::<u32>::new(0, 1));
            let head = Head::new(root);
            let registry: Registry<u32> = Registry::new(0);
            let handle = registry.register(root);

            let winner = AtomicBool::new(false);
            let tail = update(root, 5, 1, &winner);

            // Protect the root segment via the handle's hazard pointer.
            handle.hazard.store(root, Ordering::Release);

            cleanup(&head, &registry, 0, tail);

            // root must still be reachable: it was hazard-protected.
            assert_eq!(head.node.load(Ordering::Relaxed), root);

            handle.hazard.store(std::ptr::null_mut(), Ordering::Release);
            registry.unregister(handle);

            let mut curr = root;
            while !curr.is_null() {
                let next = (*curr).next_ptr();
                drop(Box::from_raw(curr));
                curr = next;
            }
        }
    }
}
