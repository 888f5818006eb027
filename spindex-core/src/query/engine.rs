//! Query front door: validation, empty-index policy and backend dispatch

use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result};
use crate::index::{EmptyIndexPolicy, ImmutableIndex};
use crate::structures::{SparseVector, Tombstones, VectorViolation};

use super::collector::{ScoredVector, SearchResult};

/// Anything that can answer a validated top-k query
///
/// Implementations must agree exactly: the same hits with bit-identical
/// scores in (score desc, id asc) order. Only `stats` may differ.
pub trait SearchBackend {
    /// Top-`limit` live vectors sharing at least one dimension with `query`.
    ///
    /// `query` must already satisfy the vector invariants and `limit` must be
    /// positive; use [`QueryEngine`] for checked access.
    fn search(&self, query: &SparseVector, limit: usize) -> SearchResult;

    /// Number of live vectors this backend can return
    fn live_count(&self) -> usize;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

impl<B: SearchBackend + ?Sized> SearchBackend for &B {
    fn search(&self, query: &SparseVector, limit: usize) -> SearchResult {
        (**self).search(query, limit)
    }

    fn live_count(&self) -> usize {
        (**self).live_count()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Immutable index paired with a newer deletion set
///
/// Lets a compacted snapshot honor deletes made after it was built.
pub struct ImmutableView<'a> {
    index: &'a ImmutableIndex,
    tombstones: Arc<Tombstones>,
    live: usize,
}

impl<'a> ImmutableView<'a> {
    pub fn new(index: &'a ImmutableIndex, tombstones: Arc<Tombstones>) -> Self {
        // The snapshot covers ids below vector_count, and the set is a
        // superset of the one it was built with
        let covered = index.vector_count();
        let live = covered - tombstones.count_below(covered);
        Self {
            index,
            tombstones,
            live,
        }
    }

    pub fn index(&self) -> &ImmutableIndex {
        self.index
    }

    pub fn tombstones(&self) -> &Arc<Tombstones> {
        &self.tombstones
    }
}

impl SearchBackend for ImmutableView<'_> {
    fn search(&self, query: &SparseVector, limit: usize) -> SearchResult {
        self.index
            .search_with_tombstones(query, limit, &self.tombstones)
    }

    fn live_count(&self) -> usize {
        self.live
    }

    fn name(&self) -> &'static str {
        "immutable"
    }
}

/// Validate a query the way every backend expects it
pub fn validate_query(query: &SparseVector, limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(Error::InvalidQuery("limit must be positive".to_string()));
    }
    query.validate().map_err(|v: VectorViolation| Error::InvalidQuery(v.to_string()))
}

/// Checked entry point over any [`SearchBackend`]
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryEngine {
    empty_index: EmptyIndexPolicy,
}

impl QueryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_empty_index_policy(mut self, policy: EmptyIndexPolicy) -> Self {
        self.empty_index = policy;
        self
    }

    /// Top-`limit` hits in (score desc, id asc) order
    pub fn query<B: SearchBackend + ?Sized>(
        &self,
        backend: &B,
        query: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ScoredVector>> {
        Ok(self.query_with_stats(backend, query, limit)?.hits)
    }

    /// Like [`QueryEngine::query`], also reporting how much work was done
    pub fn query_with_stats<B: SearchBackend + ?Sized>(
        &self,
        backend: &B,
        query: &SparseVector,
        limit: usize,
    ) -> Result<SearchResult> {
        validate_query(query, limit)?;

        if backend.live_count() == 0 {
            return match self.empty_index {
                EmptyIndexPolicy::ReturnEmpty => Ok(SearchResult::default()),
                EmptyIndexPolicy::Error => Err(Error::EmptyIndex),
            };
        }

        let result = backend.search(query, limit);
        debug!(
            "Query on {}: dims={}, limit={}, hits={}, visited={}, scored={}, pruned={}",
            backend.name(),
            query.len(),
            limit,
            result.hits.len(),
            result.stats.entries_visited,
            result.stats.candidates_scored,
            result.stats.candidates_pruned
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexConfig;
    use crate::storage::Storage;

    fn v(pairs: &[(u32, f32)]) -> SparseVector {
        SparseVector::try_from_pairs(pairs.to_vec()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_queries() {
        let mut storage = Storage::new();
        storage.insert(v(&[(1, 1.0)])).unwrap();
        let engine = QueryEngine::new();

        let unordered = SparseVector::from(vec![(5, 1.0), (2, 1.0)]);
        let duplicate = SparseVector::from(vec![(2, 1.0), (2, 1.0)]);
        let negative = SparseVector::from(vec![(2, -1.0)]);
        let nan = SparseVector::from(vec![(2, f32::NAN)]);

        for query in [&unordered, &duplicate, &negative, &nan] {
            assert!(matches!(
                engine.query(&storage, query, 5),
                Err(Error::InvalidQuery(_))
            ));
        }
        assert!(matches!(
            engine.query(&storage, &v(&[(1, 1.0)]), 0),
            Err(Error::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_empty_index_policy() {
        let storage = Storage::new();
        let query = v(&[(1, 1.0)]);

        let hits = QueryEngine::new().query(&storage, &query, 3).unwrap();
        assert!(hits.is_empty());

        let strict = QueryEngine::new().with_empty_index_policy(EmptyIndexPolicy::Error);
        assert!(matches!(
            strict.query(&storage, &query, 3),
            Err(Error::EmptyIndex)
        ));
    }

    #[test]
    fn test_view_counts_only_covered_deletes() {
        let mut storage = Storage::new();
        for w in [1.0, 2.0, 3.0] {
            storage.insert(v(&[(1, w)])).unwrap();
        }
        let snapshot = ImmutableIndex::from_storage(&storage, &IndexConfig::default()).unwrap();

        storage.delete(1).unwrap();
        storage.insert(v(&[(1, 4.0)])).unwrap();
        storage.insert(v(&[(1, 5.0)])).unwrap();
        storage.delete(4).unwrap();
        let view = ImmutableView::new(&snapshot, Arc::clone(storage.tombstones()));
        assert_eq!(view.live_count(), 2);
        assert_eq!(view.index().vector_count(), 3);

        storage.delete(0).unwrap();
        storage.delete(2).unwrap();
        let view = ImmutableView::new(&snapshot, Arc::clone(storage.tombstones()));
        assert_eq!(view.live_count(), 0);
        let strict = QueryEngine::new().with_empty_index_policy(EmptyIndexPolicy::Error);
        assert!(matches!(
            strict.query(&view, &v(&[(1, 1.0)]), 3),
            Err(Error::EmptyIndex)
        ));
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let mut storage = Storage::new();
        storage.insert(v(&[(1, 1.0)])).unwrap();
        let hits = QueryEngine::new()
            .query(&storage, &SparseVector::new(), 3)
            .unwrap();
        assert!(hits.is_empty());
    }
}
