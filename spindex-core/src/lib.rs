//! spindex - exact top-k retrieval over sparse vectors
//!
//! Vectors are sets of `(dimension, weight)` pairs scored by sparse dot
//! product. Three backends answer the same queries with identical results:
//! - `Storage`: linear full scan, the reference answer
//! - `MutableIndex`: append-friendly inverted index, exact posting-list merge
//! - `ImmutableIndex`: compacted block posting lists with per-block max
//!   weights, queried with Block-Max MaxScore so that "hot" dimensions
//!   present in most vectors are mostly skipped
//!
//! `SparseIndex` ties them together behind a single-writer / multi-reader
//! lock with lock-free publication of compacted snapshots.

pub mod error;
pub mod index;
pub mod query;
pub mod stats;
pub mod storage;
pub mod structures;

pub use error::{Error, Result};
pub use index::{
    BackendKind, EmptyIndexPolicy, ImmutableIndex, IndexConfig, MutableIndex, SparseIndex,
    StalePolicy,
};
pub use query::{
    BlockMaxScoreExecutor, ImmutableView, QueryEngine, ScoreCollector, ScoredVector,
    SearchBackend, SearchResult, SearchStats,
};
pub use stats::{CorpusStats, IndexStats, PostingStats, SnapshotStats};
pub use storage::Storage;
pub use structures::{
    BlockPostingList, PostingBlock, PostingEntry, PostingList, SparseEntry, SparseVector,
    Tombstones, VectorViolation,
};

pub type VectorId = u32;
pub type DimId = u32;
pub type Score = f32;

/// Sentinel returned by exhausted posting cursors
pub const TERMINATED: VectorId = VectorId::MAX;
