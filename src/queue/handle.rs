// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-thread registration records and the intrusive registry list.
//!
//! A thread must [`Registry::register`] before calling `put`/`get`, and
//! [`Registry::unregister`] when done. The registry itself is an
//! intrusive, CAS-linked singly-linked list of [`HandleNode`]s — membership
//! changes (push, splice-out) are the only operations serialized by
//! `Registry::lock`; reads (the reclamation scan) are lock-free.

use crate::queue::segment::Segment;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

/// Enqueue side / dequeue side, indexing `HandleNode::node`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Enq = 0,
    Deq = 1,
}

/// The per-thread record, intrusively linked into the registry.
///
/// `node[Enq]`/`node[Deq]` are this thread's cached segment references, one
/// per side; `hazard` is the single-slot hazard pointer published while a
/// segment reference is in active use; `winner` is set by whichever `put`/
/// `get` call on this thread most recently CAS-installed a new segment, and
/// consumed by the next `get` on this thread (spec.md §4.6, §9).
pub struct HandleNode<T> {
    node: [AtomicPtr<Segment<T>>; 2],
    pub(crate) hazard: AtomicPtr<Segment<T>>,
    pub(crate) winner: AtomicBool,
    next: AtomicPtr<HandleNode<T>>,
}

impl<T> HandleNode<T> {
    fn new(seed: *mut Segment<T>) -> Self {
        Self {
            node: [AtomicPtr::new(seed), AtomicPtr::new(seed)],
            hazard: AtomicPtr::new(std::ptr::null_mut()),
            winner: AtomicBool::new(false),
            next: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    #[inline]
    pub(crate) fn node_cell(&self, side: Side) -> &AtomicPtr<Segment<T>> {
        &self.node[side as usize]
    }
}

/// A registered, thread-owned handle. Opaque to callers; pass `&Handle<T>`
/// to [`crate::Queue::put`]/[`crate::Queue::get`], and the `Handle<T>`
/// itself to [`crate::Queue::unregister`] when the thread is done.
///
/// Not `Clone`/`Copy`: a handle is single-owner, matching the source's
/// contract that one thread registers one handle and uses it for the
/// lifetime of its participation (spec.md §9, Open Questions).
pub struct Handle<T> {
    pub(crate) ptr: *mut HandleNode<T>,
}

// SAFETY: a `Handle<T>` is moved to the thread that will exclusively use its
// non-shared fields; the shared fields (`hazard`, `node[*]`, `next`) are
// atomic and designed to be read by other threads (reclamation scans).
unsafe impl<T: Send> Send for Handle<T> {}

impl<T> std::ops::Deref for Handle<T> {
    type Target = HandleNode<T>;
    fn deref(&self) -> &HandleNode<T> {
        // SAFETY: `ptr` is valid from construction in `Registry::register`
        // until `Registry::unregister` consumes this `Handle<T>` and frees
        // it; the registry never frees a node while a `Handle<T>` handed to
        // a caller still points at it (that free only happens inside
        // `unregister`, which takes `self` by value).
        unsafe { &*self.ptr }
    }
}

/// The intrusive registry of all currently-registered handles, plus the
/// approximate participant count `W` used to size the reclamation
/// hysteresis (spec.md §4.3, §4.7).
pub struct Registry<T> {
    plist: AtomicPtr<HandleNode<T>>,
    lock: AtomicBool,
    w: AtomicUsize,
}

impl<T> Registry<T> {
    pub fn new(initial_participants: usize) -> Self {
        Self {
            plist: AtomicPtr::new(std::ptr::null_mut()),
            lock: AtomicBool::new(false),
            w: AtomicUsize::new(initial_participants),
        }
    }

    /// Current value of `W`, the reclamation-threshold scaler. Seeded from
    /// `QueueConfig::initial_participants` at construction, then tracked
    /// live: `register` increments it and `unregister` decrements it, so a
    /// matched register/unregister pair always nets to zero regardless of
    /// the seed — unlike the source, which treats `W0` as a fixed expected
    /// thread count and never adjusts it on `register` (an unconditional
    /// decrement-only `W` underflows the moment `unregister` calls exceed
    /// `initial_participants`, which a `QueueConfig::default()` of zero makes
    /// trivial to hit; see DESIGN.md). Safe to read without the lock:
    /// reclamation only needs it accurate with respect to registrations and
    /// unregistrations that happened-before the reclaimer-role CAS, which
    /// `unregister`'s lock already guarantees for its own side, and
    /// `register`'s CAS-push guarantees for its own.
    #[inline]
    pub fn participants(&self) -> usize {
        self.w.load(Ordering::Relaxed)
    }

    /// Register a new handle, seeding its cached node references to `seed`
    /// (the queue's current head segment). CAS-only: registration never
    /// takes `lock` (spec.md §4.3), so `W` is bumped with a plain atomic
    /// increment rather than under `lock`.
    pub fn register(&self, seed: *mut Segment<T>) -> Handle<T> {
        let node = Box::into_raw(Box::new(HandleNode::new(seed)));
        let mut curr = self.plist.load(Ordering::Acquire);
        loop {
            // SAFETY: `node` was just allocated and is not yet visible to
            // any other thread.
            unsafe { (*node).next.store(curr, Ordering::Relaxed) };
            match self.plist.compare_exchange_weak(
                curr,
                node,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => curr = actual,
            }
        }
        self.w.fetch_add(1, Ordering::Relaxed);
        Handle { ptr: node }
    }

    /// Splice `handle` out of the registry and free its storage. Takes
    /// `lock` for the duration of the splice (spec.md §4.3); the handle must
    /// not be used again afterward and must not already have been
    /// unregistered (double-`unregister` is a contract violation, spec.md
    /// §7, and — since `register` now increments `W` to match — would
    /// underflow `self.w` just as an unpaired `unregister` always did).
    pub fn unregister(&self, handle: Handle<T>) {
        self.acquire_lock();

        self.w.fetch_sub(1, Ordering::Relaxed);

        let target = handle.ptr;
        let mut prev: *mut HandleNode<T> = std::ptr::null_mut();
        let mut curr = self.plist.load(Ordering::Relaxed);

        while !curr.is_null() {
            // SAFETY: every pointer reachable from `plist` was allocated by
            // `register` and is kept alive until spliced out under `lock`,
            // which we hold.
            let next = unsafe { (*curr).next.load(Ordering::Relaxed) };
            if curr == target {
                if prev.is_null() {
                    self.plist.store(next, Ordering::Release);
                } else {
                    unsafe { (*prev).next.store(next, Ordering::Relaxed) };
                }
                break;
            }
            prev = curr;
            curr = next;
        }

        self.release_lock();

        // SAFETY: `target` has just been unlinked from `plist`, so no
        // reclamation scan (which only walks `plist`) can observe it again.
        unsafe { drop(Box::from_raw(target)) };
    }

    /// Walk the registry calling `f` on every currently-linked handle.
    /// Lock-free: membership may change concurrently (an unregistering
    /// handle is still safe to read mid-splice since it's only freed after
    /// being unlinked, and a freshly-registered handle simply may or may not
    /// be observed — both are fine for reclamation's purposes).
    pub fn for_each(&self, mut f: impl FnMut(&HandleNode<T>)) {
        let mut curr = self.plist.load(Ordering::Acquire);
        while !curr.is_null() {
            // SAFETY: see `unregister` — nodes are only freed after being
            // unlinked, and this load happens-before any such unlink we
            // haven't already observed.
            let node = unsafe { &*curr };
            f(node);
            curr = node.next.load(Ordering::Acquire);
        }
    }

    fn acquire_lock(&self) {
        while self
            .lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    fn release_lock(&self) {
        self.lock.store(false, Ordering::Release);
    }
}

impl<T> Drop for Registry<T> {
    fn drop(&mut self) {
        debug_assert!(
            self.plist.load(Ordering::Relaxed).is_null(),
            "queue destroyed with handles still registered"
        );
        // Best-effort cleanup of anything left registered (contract
        // violation per spec.md §7; we still avoid leaking in debug-off
        // builds).
        let mut curr = self.plist.load(Ordering::Relaxed);
        while !curr.is_null() {
            let next = unsafe { (*curr).next.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(curr)) };
            curr = next;
        }
    }
}
