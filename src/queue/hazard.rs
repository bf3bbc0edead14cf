// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hazard-protected node acquisition (spec.md §4.4).
//!
//! `acquire` obtains a segment reference the caller may safely dereference
//! for the duration the hazard stays published: publish the candidate,
//! fence, re-read the cached node, and retry if it moved out from under us.
//! The fence-then-re-read is what lets [`super::reclaim::cleanup`] trust
//! that observing "hazard doesn't cover segment N" means no concurrent
//! `acquire` is mid-flight toward publishing a hazard on N.

use crate::queue::segment::Segment;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Publish a hazard on the node cached in `node_cell` and return it, proven
/// stable against a concurrent write to `node_cell` during publication.
pub fn acquire<T>(
    node_cell: &AtomicPtr<Segment<T>>,
    hazard_cell: &AtomicPtr<Segment<T>>,
) -> *mut Segment<T> {
    loop {
        let candidate = node_cell.load(Ordering::Acquire);
        hazard_cell.store(candidate, Ordering::Release);
        // Full fence: pairs with the fence in the reclamation scan so that
        // "hazard not seen covering `candidate`" and "node_cell re-read as
        // `candidate`" cannot both be true unless the segment is genuinely
        // unreferenced by this thread.
        std::sync::atomic::fence(Ordering::SeqCst);
        let confirmed = node_cell.load(Ordering::Acquire);
        if confirmed == candidate {
            return candidate;
        }
        // `node_cell` moved between the publish and the re-read (another
        // thread's `update` advanced it); retry with the new value.
    }
}

/// Release the hazard published by a prior `acquire`.
#[inline]
pub fn release<T>(hazard_cell: &AtomicPtr<Segment<T>>) {
    hazard_cell.store(std::ptr::null_mut(), Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_publishes_and_returns_current_node() {
        let seg = Box::into_raw(Segment::<u32>::new(0, 1));
        let node_cell = AtomicPtr::new(seg);
        let hazard_cell = AtomicPtr::new(std::ptr::null_mut());

        let got = acquire(&node_cell, &hazard_cell);
        assert_eq!(got, seg);
        assert_eq!(hazard_cell.load(Ordering::Relaxed), seg);

        release(&hazard_cell);
        assert!(hazard_cell.load(Ordering::Relaxed).is_null());

        unsafe { drop(Box::from_raw(seg)) };
    }
}
