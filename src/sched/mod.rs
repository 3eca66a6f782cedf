//! Bucketed work scheduler: dispatches work items onto an external execution
//! pool while guaranteeing that at most one item per *bucket* runs at a time,
//! under a global parallelism cap, with priority-aware ordering across
//! buckets.
//!
//! # Architecture
//!
//! ```text
//!   enqueue ──► buckets lock ──► bucket running? ──yes──► per-bucket FIFO
//!                   │                   no
//!                   ▼
//!               heap lock ──► active < cap? ──yes──► TaskPool::spawn
//!                   │                no
//!                   ▼
//!              ready max-heap (composite priority)
//! ```
//!
//! The worker loop that runs on the pool re-feeds itself from the ready heap
//! and promotes per-bucket successors back into it, so the dispatcher logic
//! is uniform: always pop the heap.
//!
//! # Correctness Invariants
//!
//! - **Bucket mutual exclusion**: only the worker that just finished an item
//!   of bucket B ever moves B's next item out of its FIFO.
//! - **Parallelism cap**: `active` never exceeds the configured maximum.
//! - **Lock order**: `buckets` (outer) before `heap` (inner), never the
//!   reverse. No call path in this module acquires them the other way.
//! - **Work conservation**: every enqueued item is either executed or
//!   returned by [`BucketScheduler::stop_and_wait_for_completion`].
//!
//! # Module map
//! - `pool`: the [`TaskPool`] seam and a fixed-size OS-thread implementation.
//! - `scheduler`: [`BucketScheduler`] itself.

mod pool;
mod scheduler;

pub use pool::{FixedThreadPool, Job, TaskPool};
pub use scheduler::{BucketScheduler, SchedulerConfig};
