//! Concurrent sparse index
//!
//! Concurrency model:
//! - **RwLock for storage + mutable index**: one writer at a time updates
//!   both as a unit; queries against them share the read lock
//! - **ArcSwapOption for the snapshot**: readers load the compacted index
//!   lock-free and keep their `Arc` while a newer one is published
//! - **ArcSwap for tombstones**: deletes reach the immutable path without
//!   touching the lock
//! - **Mutex for compaction**: at most one rebuild at a time, so snapshots
//!   are published in generation order

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use arc_swap::{ArcSwap, ArcSwapOption};
use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::VectorId;
use crate::error::{Error, Result};
use crate::query::{ImmutableView, QueryEngine, ScoredVector, SearchResult, validate_query};
use crate::stats::IndexStats;
use crate::storage::Storage;
use crate::structures::{SparseVector, Tombstones};

use super::config::{IndexConfig, StalePolicy};
use super::immutable::ImmutableIndex;
use super::mutable::MutableIndex;

/// Which component answers a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Full scan over storage
    Storage,
    /// Exact posting-list merge
    Mutable,
    /// Published snapshot with Block-Max MaxScore
    Immutable,
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "storage" | "scan" => Ok(Self::Storage),
            "mutable" => Ok(Self::Mutable),
            "immutable" => Ok(Self::Immutable),
            other => Err(Error::InvalidQuery(format!("unknown backend: {}", other))),
        }
    }
}

struct Inner {
    storage: Storage,
    mutable: MutableIndex,
}

pub struct SparseIndex {
    config: IndexConfig,
    inner: RwLock<Inner>,
    snapshot: ArcSwapOption<ImmutableIndex>,
    tombstones: ArcSwap<Tombstones>,
    /// Inserts plus deletes since creation
    mutations: AtomicU64,
    /// Ids issued so far, published after each insert
    issued: AtomicUsize,
    compaction: Mutex<()>,
}

impl Default for SparseIndex {
    fn default() -> Self {
        Self::new(IndexConfig::default())
    }
}

impl SparseIndex {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                storage: Storage::new(),
                mutable: MutableIndex::new(),
            }),
            snapshot: ArcSwapOption::new(None),
            tombstones: ArcSwap::from_pointee(Tombstones::new()),
            mutations: AtomicU64::new(0),
            issued: AtomicUsize::new(0),
            compaction: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn engine(&self) -> QueryEngine {
        QueryEngine::new().with_empty_index_policy(self.config.empty_index)
    }

    /// Store and index a vector, returning its id
    pub fn insert(&self, vector: SparseVector) -> Result<VectorId> {
        vector
            .validate()
            .map_err(|v| Error::MalformedVector(v.to_string()))?;

        let mut inner = self.inner.write();
        let id = inner.storage.next_id()?;
        inner.storage.reserve(1)?;
        inner.mutable.insert(id, &vector)?;
        inner.storage.insert(vector)?;
        self.issued.store(inner.storage.len(), Ordering::Release);
        self.mutations.fetch_add(1, Ordering::Release);
        Ok(id)
    }

    /// Delete a live vector
    pub fn delete(&self, id: VectorId) -> Result<()> {
        let mut inner = self.inner.write();
        inner.storage.delete(id)?;
        // Same ids as storage, bitset already sized at insert
        inner.mutable.delete(id)?;
        self.tombstones.store(Arc::clone(inner.storage.tombstones()));
        self.mutations.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Rebuild the immutable index from the current state and publish it
    pub fn compact(&self) -> Result<Arc<ImmutableIndex>> {
        let _guard = self.compaction.lock();

        let index = {
            let inner = self.inner.read();
            let generation = self.mutations.load(Ordering::Acquire);
            ImmutableIndex::build(&inner.mutable, &self.config)?.with_generation(generation)
        };

        let index = Arc::new(index);
        let previous = self.snapshot.swap(Some(Arc::clone(&index)));
        debug!(
            "Published snapshot: generation={}, previous_generation={:?}, dims={}, live={}",
            index.generation(),
            previous.map(|p| p.generation()),
            index.dimension_count(),
            index.live_count()
        );
        Ok(index)
    }

    /// Currently published snapshot
    pub fn snapshot(&self) -> Option<Arc<ImmutableIndex>> {
        self.snapshot.load_full()
    }

    /// Inserts the snapshot does not cover (None without a snapshot)
    pub fn staleness(&self) -> Option<u64> {
        let snapshot = self.snapshot.load_full()?;
        Some(self.pending_inserts(&snapshot) as u64)
    }

    fn pending_inserts(&self, snapshot: &ImmutableIndex) -> usize {
        self.issued
            .load(Ordering::Acquire)
            .saturating_sub(snapshot.vector_count())
    }

    fn is_stale(&self, snapshot: &ImmutableIndex) -> bool {
        let pending = self.pending_inserts(snapshot);
        self.config
            .max_pending_inserts
            .is_some_and(|max| pending > max)
    }

    pub fn query(
        &self,
        backend: BackendKind,
        query: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ScoredVector>> {
        Ok(self.query_with_stats(backend, query, limit)?.hits)
    }

    pub fn query_with_stats(
        &self,
        backend: BackendKind,
        query: &SparseVector,
        limit: usize,
    ) -> Result<SearchResult> {
        match backend {
            BackendKind::Storage => {
                let inner = self.inner.read();
                self.engine().query_with_stats(&inner.storage, query, limit)
            }
            BackendKind::Mutable => {
                let inner = self.inner.read();
                self.engine().query_with_stats(&inner.mutable, query, limit)
            }
            BackendKind::Immutable => self.query_immutable(query, limit),
        }
    }

    fn query_immutable(&self, query: &SparseVector, limit: usize) -> Result<SearchResult> {
        let Some(snapshot) = self.snapshot.load_full() else {
            debug!("No snapshot published, answering with a full scan");
            return self.query_with_stats(BackendKind::Storage, query, limit);
        };

        let snapshot = if self.is_stale(&snapshot) {
            match self.config.stale_policy {
                StalePolicy::Serve => snapshot,
                StalePolicy::Fallback => {
                    debug!(
                        "Snapshot generation {} is stale, answering from the mutable index",
                        snapshot.generation()
                    );
                    return self.query_with_stats(BackendKind::Mutable, query, limit);
                }
                StalePolicy::Recompact => {
                    // Validate before paying for a rebuild
                    validate_query(query, limit)?;
                    self.compact()?
                }
            }
        } else {
            snapshot
        };

        let view = ImmutableView::new(&snapshot, self.tombstones.load_full());
        self.engine().query_with_stats(&view, query, limit)
    }

    /// Corpus and index statistics
    pub fn statistics(&self) -> IndexStats {
        let inner = self.inner.read();
        let snapshot = self.snapshot.load_full();
        IndexStats::collect(&inner.storage, &inner.mutable, snapshot.as_deref())
            .with_staleness(self.staleness())
    }

    /// Ids issued so far, including deleted ones
    pub fn len(&self) -> usize {
        self.inner.read().storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn live_count(&self) -> usize {
        self.inner.read().storage.live_count()
    }

    /// Live vector by id
    pub fn get(&self, id: VectorId) -> Option<SparseVector> {
        self.inner.read().storage.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::EmptyIndexPolicy;

    fn v(pairs: &[(u32, f32)]) -> SparseVector {
        SparseVector::try_from_pairs(pairs.to_vec()).unwrap()
    }

    fn ids(hits: &[ScoredVector]) -> Vec<VectorId> {
        hits.iter().map(|h| h.id).collect()
    }

    #[test]
    fn test_insert_delete_counts() {
        let index = SparseIndex::default();
        assert_eq!(index.insert(v(&[(1, 1.0)])).unwrap(), 0);
        assert_eq!(index.insert(v(&[(2, 1.0)])).unwrap(), 1);
        assert!(matches!(
            index.insert(SparseVector::from(vec![(1, 0.0)])),
            Err(Error::MalformedVector(_))
        ));
        index.delete(0).unwrap();
        assert!(matches!(index.delete(0), Err(Error::UnknownId(0))));
        assert!(matches!(index.delete(5), Err(Error::UnknownId(5))));

        assert_eq!(index.len(), 2);
        assert_eq!(index.live_count(), 1);
        assert!(index.get(0).is_none());
        assert!(index.get(1).is_some());
    }

    #[test]
    fn test_immutable_without_snapshot_scans() {
        let index = SparseIndex::default();
        index.insert(v(&[(1, 1.0)])).unwrap();
        let hits = index
            .query(BackendKind::Immutable, &v(&[(1, 1.0)]), 3)
            .unwrap();
        assert_eq!(ids(&hits), vec![0]);
        assert!(index.snapshot().is_none());
        assert_eq!(index.staleness(), None);
    }

    #[test]
    fn test_snapshot_honors_later_deletes() {
        let index = SparseIndex::default();
        index.insert(v(&[(1, 1.0)])).unwrap();
        index.insert(v(&[(1, 2.0)])).unwrap();
        let snapshot = index.compact().unwrap();
        assert_eq!(snapshot.generation(), 2);

        index.delete(1).unwrap();
        assert_eq!(index.staleness(), Some(0));

        let query = v(&[(1, 1.0)]);
        let hits = index.query(BackendKind::Immutable, &query, 3).unwrap();
        assert_eq!(ids(&hits), vec![0]);
        // The caller's Arc still sees its own state
        assert_eq!(snapshot.search(&query, 3).hits.len(), 2);
    }

    #[test]
    fn test_stale_policies() {
        let query = v(&[(1, 1.0)]);
        for (policy, expected) in [
            (StalePolicy::Serve, vec![0]),
            (StalePolicy::Fallback, vec![1, 0]),
            (StalePolicy::Recompact, vec![1, 0]),
        ] {
            let config = IndexConfig::default()
                .with_max_pending_inserts(0)
                .with_stale_policy(policy);
            let index = SparseIndex::new(config);
            index.insert(v(&[(1, 1.0)])).unwrap();
            index.compact().unwrap();
            index.insert(v(&[(1, 2.0)])).unwrap();

            let hits = index.query(BackendKind::Immutable, &query, 5).unwrap();
            assert_eq!(ids(&hits), expected, "policy {:?}", policy);
        }
    }

    #[test]
    fn test_default_config_sees_inserts_after_compaction() {
        let index = SparseIndex::default();
        index.insert(v(&[(1, 1.0)])).unwrap();
        index.compact().unwrap();
        index.insert(v(&[(1, 5.0)])).unwrap();
        assert_eq!(index.staleness(), Some(1));

        let query = v(&[(1, 1.0)]);
        let scan = index.query(BackendKind::Storage, &query, 5).unwrap();
        assert_eq!(ids(&scan), vec![1, 0]);
        assert_eq!(index.query(BackendKind::Immutable, &query, 5).unwrap(), scan);

        index.compact().unwrap();
        assert_eq!(index.staleness(), Some(0));
        assert_eq!(index.query(BackendKind::Immutable, &query, 5).unwrap(), scan);
    }

    #[test]
    fn test_without_staleness_limit_serves_old_snapshot() {
        let index = SparseIndex::new(IndexConfig::default().without_staleness_limit());
        index.insert(v(&[(1, 1.0)])).unwrap();
        index.compact().unwrap();
        index.insert(v(&[(1, 5.0)])).unwrap();

        let hits = index.query(BackendKind::Immutable, &v(&[(1, 1.0)]), 5).unwrap();
        assert_eq!(ids(&hits), vec![0]);
    }

    #[test]
    fn test_empty_index_error_policy() {
        let config = IndexConfig::default().with_empty_index_policy(EmptyIndexPolicy::Error);
        let index = SparseIndex::new(config);
        for backend in [
            BackendKind::Storage,
            BackendKind::Mutable,
            BackendKind::Immutable,
        ] {
            assert!(matches!(
                index.query(backend, &v(&[(1, 1.0)]), 1),
                Err(Error::EmptyIndex)
            ));
        }
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("immutable".parse::<BackendKind>().unwrap(), BackendKind::Immutable);
        assert_eq!("scan".parse::<BackendKind>().unwrap(), BackendKind::Storage);
        assert!("hnsw".parse::<BackendKind>().is_err());
    }
}
