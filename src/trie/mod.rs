//! Compact prefix tree: an insert-only string-to-value map with shortest,
//! exact, and longest prefix queries over a text region.
//!
//! # Scope
//! The tree is a hybrid of trie and radix tree stored in two dense arrays.
//! Each node carries one inline "fast" edge for the common unary-continuation
//! case plus an overflow list for genuine branching, so lookups walk flat
//! memory instead of chasing per-node maps. Keys are never deleted; match
//! records keep their insertion index for the lifetime of the tree.
//!
//! # Module map
//! - `node`: node layout, index sentinels, and the first-byte root table.
//! - `tree`: [`PrefixTree`] itself, insertion restructuring, and the shared
//!   matcher behind the three query modes.
//! - `iter`: insertion-order iteration over the match records.
//!
//! # Threading
//! No internal synchronization. Concurrent reads are safe only while no
//! writer is active; writers must be externally serialized.

mod iter;
mod node;
mod tree;

pub use iter::Iter;
pub use tree::{MatchPair, PrefixTree, TreeConfig, TreeError};
