//! Index components: the mutable and immutable inverted indexes and the
//! concurrent `SparseIndex` that combines them with storage

mod config;
mod immutable;
mod mutable;
mod sparse_index;

pub use config::{EmptyIndexPolicy, IndexConfig, StalePolicy};
pub use immutable::ImmutableIndex;
pub use mutable::MutableIndex;
pub use sparse_index::{BackendKind, SparseIndex};
