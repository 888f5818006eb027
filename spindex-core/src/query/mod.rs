//! Query execution: top-k collection, Block-Max MaxScore and the query engine

mod collector;
mod engine;
mod scoring;

pub use collector::{HeapEntry, ScoreCollector, ScoredVector, SearchResult, SearchStats};
pub use engine::{ImmutableView, QueryEngine, SearchBackend, validate_query};
pub use scoring::{BlockMaxScoreExecutor, ScoringIterator, SparseTermScorer};
