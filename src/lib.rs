// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # wfqueue - wait-free multi-producer/multi-consumer FIFO queue
//!
//! A low-level concurrency primitive: producers [`Queue::put`] opaque items,
//! consumers [`Queue::get`] them back in strict FIFO order, with no global
//! lock on either hot path. Bounded only by memory.
//!
//! ## Quick Start
//!
//! ```
//! use wfqueue::{Queue, QueueConfig};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let queue = Arc::new(Queue::new(QueueConfig::new(510, 2).unwrap()));
//!
//! let producer = {
//!     let queue = Arc::clone(&queue);
//!     thread::spawn(move || {
//!         let handle = queue.register();
//!         queue.put(&handle, "hello");
//!         queue.unregister(handle);
//!     })
//! };
//!
//! let consumer_handle = queue.register();
//! producer.join().unwrap();
//! assert_eq!(queue.get(&consumer_handle), "hello");
//! queue.unregister(consumer_handle);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------------------------------------+
//! |                          Queue<T> root                            |
//! |   tail[ENQ], tail[DEQ] ticket counters  |  registry (handles)     |
//! +-------------------------------------------------------------------+
//! |                      Segment list (lazily grown)                  |
//! |   Segment(id=0) -> Segment(id=1) -> ... -> Segment(id=N)          |
//! |   each holding `segment_capacity` cache-line-sized slots           |
//! +-------------------------------------------------------------------+
//! |         Hazard-pointer reclamation (runs on the dequeue side)      |
//! |   scans all registered handles -> frees fully-drained segments    |
//! +-------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Queue`] | The queue itself; one per logical FIFO channel |
//! | [`queue::handle::Handle`] | Per-thread registration; required before `put`/`get` |
//! | [`QueueConfig`] | Segment capacity and initial participant count |
//! | [`QueueError`] | The (construction-only) fallible surface |
//!
//! ## Modules Overview
//!
//! - [`queue`] - the queue itself: ticket counters, segment list, hazard
//!   pointers, reclamation, and the slot handshake
//! - [`config`] - construction parameters
//! - [`error`] - the construction-time error type
//! - [`logging`] - optional, feature-gated diagnostic logging
//!
//! ## Non-goals
//!
//! No bounded-capacity/backpressure mode, no priorities or multi-queue
//! selection, no persistence, no non-blocking `get`. No benchmarking
//! harness, thread-spawning helper, or CLI — callers own their own threads.

pub mod config;
pub mod error;
pub mod logging;
pub mod queue;

pub use config::QueueConfig;
pub use error::QueueError;
pub use queue::handle::Handle;
pub use queue::Queue;
