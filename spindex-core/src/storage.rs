//! Vector storage and the full-scan reference search
//!
//! Vectors are kept in insertion order; a vector's id is its position.
//! Deleting a vector frees its entries and records the id in a shared
//! [`Tombstones`] set. The set is copied on write, so readers holding an
//! older `Arc` never see later deletes.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::query::{ScoreCollector, SearchBackend, SearchResult, SearchStats};
use crate::structures::{SparseVector, Tombstones};
use crate::{TERMINATED, VectorId};

#[derive(Debug, Clone, Default)]
pub struct Storage {
    vectors: Vec<SparseVector>,
    tombstones: Arc<Tombstones>,
    live: usize,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next insert will receive
    pub fn next_id(&self) -> Result<VectorId> {
        match VectorId::try_from(self.vectors.len()) {
            Ok(id) if id < TERMINATED => Ok(id),
            _ => Err(Error::OutOfMemory),
        }
    }

    /// Reserve room for `additional` more vectors
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        self.vectors.try_reserve(additional)?;
        Ok(())
    }

    /// Validate and append a vector, returning its id
    pub fn insert(&mut self, vector: SparseVector) -> Result<VectorId> {
        vector
            .validate()
            .map_err(|v| Error::MalformedVector(v.to_string()))?;
        let id = self.next_id()?;
        self.reserve(1)?;
        self.vectors.push(vector);
        self.live += 1;
        Ok(id)
    }

    /// Tombstone a live id
    pub fn delete(&mut self, id: VectorId) -> Result<()> {
        if !self.is_live(id) {
            return Err(Error::UnknownId(id));
        }
        match Arc::get_mut(&mut self.tombstones) {
            Some(tombstones) => {
                tombstones.mark(id)?;
            }
            None => {
                // Shared with readers: copy with fallible growth, then swap
                let mut copy = self.tombstones.try_clone_for(id)?;
                copy.mark(id)?;
                self.tombstones = Arc::new(copy);
            }
        }
        self.vectors[id as usize] = SparseVector::new();
        self.live -= 1;
        Ok(())
    }

    /// Whether `id` was issued and not deleted
    pub fn is_live(&self, id: VectorId) -> bool {
        (id as usize) < self.vectors.len() && self.tombstones.is_live(id)
    }

    /// Vector for a live id
    pub fn get(&self, id: VectorId) -> Option<&SparseVector> {
        if self.is_live(id) {
            self.vectors.get(id as usize)
        } else {
            None
        }
    }

    /// Number of ids issued, including deleted ones
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn tombstones(&self) -> &Arc<Tombstones> {
        &self.tombstones
    }

    /// Live vectors with their ids, in id order
    pub fn iter(&self) -> impl Iterator<Item = (VectorId, &SparseVector)> {
        self.vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i as VectorId, v))
            .filter(|&(id, _)| self.tombstones.is_live(id))
    }

    /// Score every live vector sharing a dimension with `query`
    pub fn full_scan(&self, query: &SparseVector, limit: usize) -> SearchResult {
        let mut collector = ScoreCollector::new(limit);
        let mut stats = SearchStats::default();

        for (id, vector) in self.iter() {
            stats.entries_visited += vector.len() as u64;
            if let Some(score) = query.overlap_dot(vector) {
                stats.candidates_scored += 1;
                collector.insert(id, score);
            }
        }

        SearchResult {
            hits: collector.into_sorted_results(),
            stats,
        }
    }
}

impl SearchBackend for Storage {
    fn search(&self, query: &SparseVector, limit: usize) -> SearchResult {
        self.full_scan(query, limit)
    }

    fn live_count(&self) -> usize {
        self.live
    }

    fn name(&self) -> &'static str {
        "storage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(pairs: &[(u32, f32)]) -> SparseVector {
        SparseVector::try_from_pairs(pairs.to_vec()).unwrap()
    }

    #[test]
    fn test_insert_assigns_dense_ids() {
        let mut storage = Storage::new();
        assert_eq!(storage.insert(v(&[(1, 1.0)])).unwrap(), 0);
        assert_eq!(storage.insert(v(&[(2, 1.0)])).unwrap(), 1);
        assert_eq!(storage.get(1).unwrap().weight(2), Some(1.0));
        assert!(storage.get(2).is_none());

        let bad = SparseVector::from(vec![(3, 1.0), (1, 1.0)]);
        assert!(matches!(storage.insert(bad), Err(Error::MalformedVector(_))));
        assert_eq!(storage.len(), 2);
    }

    #[test]
    fn test_delete() {
        let mut storage = Storage::new();
        storage.insert(v(&[(1, 1.0)])).unwrap();
        storage.insert(v(&[(1, 2.0)])).unwrap();

        let before = Arc::clone(storage.tombstones());
        storage.delete(0).unwrap();
        assert!(matches!(storage.delete(0), Err(Error::UnknownId(0))));
        assert!(matches!(storage.delete(7), Err(Error::UnknownId(7))));

        assert!(storage.get(0).is_none());
        assert_eq!(storage.live_count(), 1);
        assert_eq!(storage.len(), 2);
        // Readers holding the old set are unaffected
        assert!(before.is_live(0));
        assert!(storage.tombstones().is_dead(0));
        assert!(!Arc::ptr_eq(&before, storage.tombstones()));
    }

    #[test]
    fn test_delete_copies_shared_tombstones_only() {
        let mut storage = Storage::new();
        for i in 0..200 {
            storage.insert(v(&[(i, 1.0)])).unwrap();
        }

        // Unshared: marked in place
        storage.delete(10).unwrap();
        let unshared = Arc::as_ptr(storage.tombstones());
        storage.delete(150).unwrap();
        assert_eq!(Arc::as_ptr(storage.tombstones()), unshared);

        // Shared: a fresh copy, the held one keeps its state
        let held = Arc::clone(storage.tombstones());
        storage.delete(199).unwrap();
        assert!(held.is_live(199));
        assert_eq!(held.len(), 2);
        assert_eq!(
            storage.tombstones().iter().collect::<Vec<_>>(),
            vec![10, 150, 199]
        );
        assert_eq!(storage.live_count(), 197);
    }

    #[test]
    fn test_full_scan_orders_and_filters() {
        let mut storage = Storage::new();
        storage.insert(v(&[(1, 1.0), (5, 1.0)])).unwrap(); // 0: 3.0
        storage.insert(v(&[(2, 9.0)])).unwrap(); // 1: no overlap
        storage.insert(v(&[(5, 1.5)])).unwrap(); // 2: 3.0
        storage.insert(v(&[(1, 4.0)])).unwrap(); // 3: 4.0
        storage.insert(v(&[(1, 0.5)])).unwrap(); // 4: 0.5
        storage.delete(3).unwrap();

        let query = v(&[(1, 1.0), (5, 2.0)]);
        let hits: Vec<_> = storage
            .full_scan(&query, 3)
            .hits
            .iter()
            .map(|h| (h.id, h.score))
            .collect();
        assert_eq!(hits, vec![(0, 3.0), (2, 3.0), (4, 0.5)]);
    }
}
