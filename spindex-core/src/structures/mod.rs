//! Core data structures: sparse vectors, tombstones and posting lists

mod block;
mod posting;
mod sparse_vector;
mod tombstones;

pub use block::{BLOCK_SIZE, BlockCursor, BlockPostingList, MIN_BLOCK_SIZE, PostingBlock};
pub use posting::{PostingEntry, PostingList};
pub use sparse_vector::{SparseEntry, SparseVector, VectorViolation};
pub use tombstones::Tombstones;
