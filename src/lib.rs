//! Allocation-light in-memory collections for hot paths, plus a bucketed
//! work scheduler built on top of them.
//!
//! The crate provides four independent pieces:
//! - [`PrefixTree`]: an insert-only compact prefix tree over flat arrays,
//!   with shortest/exact/longest prefix queries against any text region.
//! - [`BucketScheduler`]: a concurrent scheduler that runs at most one work
//!   item per user-defined bucket at a time, under a global parallelism cap,
//!   with priority-aware ordering between buckets.
//! - [`BinaryHeap`]: a one-based array-backed min-heap with explicit
//!   capacity control (also the scheduler's ready queue).
//! - [`SubstringMap`]: a seeded hash map keyed by string contents, probed
//!   without materializing keys.
//!
//! # Design themes
//! - Dense arrays and `u32` indices instead of pointer graphs; growth by
//!   doubling with caller-settable capacity.
//! - Typed errors for every contract violation; container state commits
//!   only on success.
//! - The collections carry no internal locks; the scheduler owns exactly
//!   two, with a fixed acquisition order.

pub mod heap;
pub mod sched;
pub mod subdict;
pub mod trie;

pub use heap::{BinaryHeap, HeapError};
pub use sched::{BucketScheduler, FixedThreadPool, Job, SchedulerConfig, TaskPool};
pub use subdict::{SubdictError, SubstringMap};
pub use trie::{MatchPair, PrefixTree, TreeConfig, TreeError};

/// How an insert treats a key that is already present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertPolicy {
    /// Fail with a duplicate-key error.
    Reject,
    /// Replace the stored value.
    Overwrite,
    /// Keep the stored value and report no modification.
    Skip,
}
