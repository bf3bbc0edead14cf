// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The wait-free MPMC FIFO queue itself (spec.md §6, the six external
//! operations).
//!
//! Control flow on `put`/`get`: acquire a hazard-protected segment
//! reference ([`hazard::acquire`]) -> fetch-and-add the relevant ticket
//! ([`ticket`]) -> walk/extend the segment list to the ticket's target if
//! needed ([`segment::update`]) -> touch the slot ([`slot::Slot`]) -> on the
//! dequeue side, if this thread just extended the list, reclaim
//! ([`reclaim::cleanup`]) -> release the hazard.

pub mod handle;
pub mod hazard;
pub mod reclaim;
pub mod segment;
pub mod slot;
pub mod ticket;

use crate::config::QueueConfig;
use handle::{Handle, Registry, Side};
use reclaim::Head;
use segment::Segment;
use std::sync::atomic::Ordering;
use ticket::TicketCounter;

/// A wait-free, linearizable, multi-producer/multi-consumer FIFO queue.
///
/// Producers and consumers each register a [`Handle`] once, then call
/// [`Queue::put`]/[`Queue::get`] any number of times from that same thread,
/// and finally [`Queue::unregister`] it. See the crate root for a complete
/// example.
pub struct Queue<T> {
    head: Head<T>,
    tail: [TicketCounter; 2],
    registry: Registry<T>,
    config: QueueConfig,
}

// SAFETY: all shared state is reached only through atomics, and every
// segment/handle a thread dereferences is kept alive by the hazard-pointer
// discipline in `hazard` and `reclaim`.
unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    /// `init`: allocate the first segment and zero both ticket counters.
    pub fn new(config: QueueConfig) -> Self {
        let first = Box::into_raw(Segment::new(0, config.segment_capacity));
        crate::debug!(
            "queue initialized: segment_capacity={} initial_participants={}",
            config.segment_capacity,
            config.initial_participants
        );
        Self {
            head: Head::new(first),
            tail: [TicketCounter::new(), TicketCounter::new()],
            registry: Registry::new(config.initial_participants),
            config,
        }
    }

    /// Register the calling thread. Must be called once before that thread
    /// calls `put`/`get`, and the returned handle must outlive every such
    /// call and the eventual `unregister` (spec.md §6, §9).
    pub fn register(&self) -> Handle<T> {
        let seed = self.head.node.load(Ordering::Acquire);
        let handle = self.registry.register(seed);
        crate::debug!("handle registered");
        handle
    }

    /// Unregister a handle previously obtained from `register`. The handle
    /// must not be used again afterward.
    pub fn unregister(&self, handle: Handle<T>) {
        self.registry.unregister(handle);
        crate::debug!("handle unregistered, W={}", self.registry.participants());
    }

    /// Enqueue `item`. Never blocks: at most a bounded number of steps per
    /// concurrent segment-extension race (spec.md §4.5).
    pub fn put(&self, handle: &Handle<T>, item: T) {
        let node_cell = handle.node_cell(Side::Enq);
        let mut node = hazard::acquire(node_cell, &handle.hazard);

        let i = self.tail[Side::Enq as usize].next();
        let (ni, li) = ticket::coordinates(i, self.config.segment_capacity);

        if unsafe { (*node).id } != ni {
            // SAFETY: `node` is hazard-protected and has id <= ni (tickets
            // only move forward), satisfying `update`'s precondition.
            node = unsafe { segment::update(node, ni, self.config.segment_capacity, &handle.winner) };
            node_cell.store(node, Ordering::Release);
        }

        unsafe { (*node).slot(li).put(item) };
        hazard::release(&handle.hazard);
    }

    /// Dequeue the next item in FIFO order, blocking (busy-waiting) until
    /// one is available in this call's assigned slot (spec.md §4.6). There
    /// is no non-blocking variant by design (spec.md §1).
    pub fn get(&self, handle: &Handle<T>) -> T {
        let node_cell = handle.node_cell(Side::Deq);
        let mut node = hazard::acquire(node_cell, &handle.hazard);

        let i = self.tail[Side::Deq as usize].next();
        let (ni, li) = ticket::coordinates(i, self.config.segment_capacity);

        if unsafe { (*node).id } != ni {
            // SAFETY: see `put` above.
            node = unsafe { segment::update(node, ni, self.config.segment_capacity, &handle.winner) };
            node_cell.store(node, Ordering::Release);
        }

        let value = unsafe { (*node).slot(li).spin_take() };

        if handle.winner.swap(false, Ordering::Relaxed) {
            let hysteresis = QueueConfig::hysteresis_for(self.registry.participants());
            crate::debug!("running reclamation pass, hysteresis={}", hysteresis);
            reclaim::cleanup(&self.head, &self.registry, hysteresis, node);
        }

        hazard::release(&handle.hazard);
        value
    }
}

impl<T> Drop for Queue<T> {
    /// `destroy`: frees all remaining segments. Requires the registry to be
    /// empty (spec.md §6) — debug-asserted, since an outstanding handle
    /// referencing freed segments is a use-after-free the queue cannot
    /// itself detect at runtime without paying for it on every op.
    fn drop(&mut self) {
        let mut curr = self.head.node.load(Ordering::Acquire);
        while !curr.is_null() {
            // SAFETY: the registry is required to be empty at this point
            // (see above), so no handle references any remaining segment.
            let next = unsafe { (*curr).next_ptr() };
            unsafe { drop(Box::from_raw(curr)) };
            curr = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use std::sync::Arc;
    use std::thread;

    fn small_queue<T>() -> Queue<T> {
        Queue::new(QueueConfig::new(2, 1).unwrap())
    }

    #[test]
    fn single_thread_round_trip_is_fifo() {
        let queue = small_queue::<&'static str>();
        let handle = queue.register();

        for item in ["a", "b", "c", "d", "e"] {
            queue.put(&handle, item);
        }
        let mut out = Vec::new();
        for _ in 0..5 {
            out.push(queue.get(&handle));
        }
        assert_eq!(out, vec!["a", "b", "c", "d", "e"]);

        queue.unregister(handle);
    }

    #[test]
    fn crosses_a_segment_boundary() {
        // capacity 2: the 3rd ticket (index 2) must land in segment 1.
        let queue = small_queue::<u32>();
        let handle = queue.register();

        queue.put(&handle, 1);
        queue.put(&handle, 2);
        queue.put(&handle, 3);

        assert_eq!(queue.get(&handle), 1);
        assert_eq!(queue.get(&handle), 2);
        assert_eq!(queue.get(&handle), 3);

        queue.unregister(handle);
    }

    #[test]
    fn two_producers_one_consumer_preserves_each_producers_order() {
        let queue = Arc::new(Queue::<(u32, u32)>::new(QueueConfig::new(4, 2).unwrap()));
        let consumer_handle = queue.register();

        let producers: Vec<_> = (0..2u32)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let handle = queue.register();
                    for i in 0..4u32 {
                        queue.put(&handle, (p, i));
                    }
                    queue.unregister(handle);
                })
            })
            .collect();

        let mut last_seen = [None; 2];
        let mut total = 0;
        while total < 8 {
            let (p, i) = queue.get(&consumer_handle);
            if let Some(last) = last_seen[p as usize] {
                assert!(i > last, "producer {p} delivered out of order");
            }
            last_seen[p as usize] = Some(i);
            total += 1;
        }

        for producer in producers {
            producer.join().unwrap();
        }
        queue.unregister(consumer_handle);
    }

    #[test]
    fn contention_on_segment_boundary_exactly_one_winner_per_extension() {
        let queue = Arc::new(Queue::<u32>::new(QueueConfig::new(2, 4).unwrap()));
        let barrier = Arc::new(std::sync::Barrier::new(4));

        let threads: Vec<_> = (0..4u32)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let handle = queue.register();
                    barrier.wait();
                    queue.put(&handle, 1);
                    let won = handle.winner.load(Ordering::Relaxed);
                    queue.unregister(handle);
                    won
                })
            })
            .collect();

        // Exactly the threads whose tickets crossed into a not-yet-existing
        // segment contend for each extension CAS; with capacity 2 and 4
        // puts, tickets 0,1 fit in segment 0 and tickets 2,3 need segment 1,
        // so exactly one `put` call wins that one extension.
        let winners = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn reclamation_bounds_segment_count_over_many_round_trips() {
        let queue = small_queue::<u32>();
        let handle = queue.register();

        for i in 0..40u32 {
            queue.put(&handle, i);
            assert_eq!(queue.get(&handle), i);
        }

        // After quiescence the head should have advanced well past segment 0.
        let head_id = unsafe { (*queue.head.node.load(Ordering::Relaxed)).id };
        assert!(head_id > 0, "reclamation never advanced the head");

        queue.unregister(handle);
    }

    #[test]
    fn dynamic_membership_register_and_unregister_mid_workload() {
        let queue = Arc::new(Queue::<u32>::new(QueueConfig::new(4, 2).unwrap()));
        let consumer = queue.register();

        let handles: Vec<_> = (0..4).map(|_| queue.register()).collect();
        for (i, h) in handles.iter().enumerate() {
            queue.put(h, i as u32);
        }

        // Unregister half the producers mid-workload.
        let mut handles = handles;
        let dropped = handles.split_off(2);
        for h in dropped {
            queue.unregister(h);
        }

        for h in &handles {
            queue.put(h, 99);
        }

        let mut total = 0;
        for _ in 0..6 {
            queue.get(&consumer);
            total += 1;
        }
        assert_eq!(total, 6);

        for h in handles {
            queue.unregister(h);
        }
        queue.unregister(consumer);

        // All 5 registrations (consumer + 4 producers) have since been
        // unregistered, so `W` must have returned to its seed value rather
        // than drifting or underflowing.
        assert_eq!(queue.registry.participants(), 2);
    }

    #[test]
    fn dropping_the_queue_runs_destructors_of_undequeued_items() {
        use std::sync::atomic::AtomicUsize;

        struct DropCounter(Arc<AtomicUsize>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let queue = small_queue::<DropCounter>();
        let handle = queue.register();

        // Enough items to span multiple segments (capacity 2), none of them
        // ever `get`-drained.
        for _ in 0..5 {
            queue.put(&handle, DropCounter(Arc::clone(&drops)));
        }

        queue.unregister(handle);
        drop(queue);

        assert_eq!(
            drops.load(Ordering::Relaxed),
            5,
            "items enqueued but never dequeued must still be dropped when the queue is dropped"
        );
    }
}
