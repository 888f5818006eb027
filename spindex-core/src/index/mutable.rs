//! Append-friendly inverted index
//!
//! One [`PostingList`] per dimension. Inserts append, deletes only flip a
//! tombstone bit, and searches merge the query dimensions' lists exactly
//! without any pruning.

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::query::{ScoreCollector, SearchBackend, SearchResult, SearchStats};
use crate::structures::{PostingList, SparseVector, Tombstones};
use crate::{DimId, TERMINATED, VectorId};

#[derive(Debug, Clone, Default)]
pub struct MutableIndex {
    postings: FxHashMap<DimId, PostingList>,
    tombstones: Tombstones,
    /// One past the largest id indexed so far
    vector_count: usize,
    live: usize,
    entry_count: usize,
}

impl MutableIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `vector` under `id`
    ///
    /// Ids must be inserted in increasing order. All capacity is reserved
    /// before any list is touched, so a failed insert leaves the index as
    /// it was.
    pub fn insert(&mut self, id: VectorId, vector: &SparseVector) -> Result<()> {
        vector
            .validate()
            .map_err(|v| Error::MalformedVector(v.to_string()))?;
        if id == TERMINATED {
            return Err(Error::OutOfMemory);
        }
        if (id as usize) < self.vector_count {
            return Err(Error::MalformedVector(format!(
                "vector id {} is not above the last indexed id",
                id
            )));
        }

        // Phase 1: reserve everything
        let mut fresh = Vec::new();
        for entry in vector.iter() {
            match self.postings.get_mut(&entry.dim_id) {
                Some(list) => list.try_reserve(1)?,
                None => {
                    fresh.try_reserve(1)?;
                    fresh.push((entry.dim_id, PostingList::try_with_capacity(1)?));
                }
            }
        }
        self.postings.try_reserve(fresh.len())?;
        self.tombstones.try_reserve(id)?;

        // Phase 2: apply
        for entry in vector.iter() {
            if let Some(list) = self.postings.get_mut(&entry.dim_id) {
                list.push(id, entry.weight);
            }
        }
        for (dim_id, mut list) in fresh {
            if let Some(weight) = vector.weight(dim_id) {
                list.push(id, weight);
            }
            self.postings.insert(dim_id, list);
        }

        self.vector_count = id as usize + 1;
        self.live += 1;
        self.entry_count += vector.len();
        Ok(())
    }

    /// Tombstone `id`; its postings stay until the next compaction
    pub fn delete(&mut self, id: VectorId) -> Result<()> {
        if (id as usize) >= self.vector_count || self.tombstones.is_dead(id) {
            return Err(Error::UnknownId(id));
        }
        self.tombstones.mark(id)?;
        self.live -= 1;
        Ok(())
    }

    pub fn is_live(&self, id: VectorId) -> bool {
        (id as usize) < self.vector_count && self.tombstones.is_live(id)
    }

    /// Exact top-`limit` by accumulating every posting of the query dims
    pub fn search(&self, query: &SparseVector, limit: usize) -> SearchResult {
        let mut stats = SearchStats::default();
        let mut scores: FxHashMap<VectorId, f32> = FxHashMap::default();

        for q in query.iter() {
            let Some(list) = self.postings.get(&q.dim_id) else {
                continue;
            };
            stats.entries_visited += list.len() as u64;
            for posting in list.iter() {
                if self.tombstones.is_dead(posting.id) {
                    continue;
                }
                *scores.entry(posting.id).or_insert(0.0) += q.weight * posting.weight;
            }
        }

        stats.candidates_scored = scores.len() as u64;
        let mut collector = ScoreCollector::new(limit);
        for (id, score) in scores {
            collector.insert(id, score);
        }

        SearchResult {
            hits: collector.into_sorted_results(),
            stats,
        }
    }

    pub fn posting(&self, dim_id: DimId) -> Option<&PostingList> {
        self.postings.get(&dim_id)
    }

    /// All posting lists, in no particular order
    pub fn postings(&self) -> impl Iterator<Item = (DimId, &PostingList)> {
        self.postings.iter().map(|(&dim, list)| (dim, list))
    }

    pub fn dimension_count(&self) -> usize {
        self.postings.len()
    }

    /// Stored postings, including those of deleted vectors
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn vector_count(&self) -> usize {
        self.vector_count
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn tombstones(&self) -> &Tombstones {
        &self.tombstones
    }
}

impl SearchBackend for MutableIndex {
    fn search(&self, query: &SparseVector, limit: usize) -> SearchResult {
        MutableIndex::search(self, query, limit)
    }

    fn live_count(&self) -> usize {
        self.live
    }

    fn name(&self) -> &'static str {
        "mutable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(pairs: &[(u32, f32)]) -> SparseVector {
        SparseVector::try_from_pairs(pairs.to_vec()).unwrap()
    }

    #[test]
    fn test_insert_builds_postings() {
        let mut index = MutableIndex::new();
        index.insert(0, &v(&[(1, 0.5), (7, 1.0)])).unwrap();
        index.insert(1, &v(&[(7, 2.0)])).unwrap();

        assert_eq!(index.dimension_count(), 2);
        assert_eq!(index.entry_count(), 3);
        let ids: Vec<_> = index.posting(7).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert!(index.posting(3).is_none());
    }

    #[test]
    fn test_rejected_insert_changes_nothing() {
        let mut index = MutableIndex::new();
        index.insert(3, &v(&[(1, 1.0)])).unwrap();

        let bad = SparseVector::from(vec![(2, 1.0), (9, -1.0)]);
        assert!(matches!(index.insert(4, &bad), Err(Error::MalformedVector(_))));
        assert!(matches!(
            index.insert(2, &v(&[(5, 1.0)])),
            Err(Error::MalformedVector(_))
        ));
        assert_eq!(index.dimension_count(), 1);
        assert_eq!(index.entry_count(), 1);
    }

    #[test]
    fn test_search_skips_deleted() {
        let mut index = MutableIndex::new();
        index.insert(0, &v(&[(1, 1.0), (2, 1.0)])).unwrap();
        index.insert(1, &v(&[(1, 3.0)])).unwrap();
        index.insert(2, &v(&[(2, 0.5)])).unwrap();
        index.delete(1).unwrap();
        assert!(matches!(index.delete(1), Err(Error::UnknownId(1))));
        assert!(matches!(index.delete(9), Err(Error::UnknownId(9))));

        let query = v(&[(1, 1.0), (2, 2.0)]);
        let hits: Vec<_> = index
            .search(&query, 10)
            .hits
            .iter()
            .map(|h| (h.id, h.score))
            .collect();
        assert_eq!(hits, vec![(0, 3.0), (2, 1.0)]);
        assert_eq!(index.live_count(), 2);
    }
}
