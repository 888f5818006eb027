//! Top-k collection and search response types

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::{Score, VectorId};

/// A search hit: vector id with its dot-product score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredVector {
    pub id: VectorId,
    pub score: Score,
}

/// Work counters reported by every backend
///
/// Deterministic for a fixed snapshot and query, which makes them usable
/// in tests where wall-clock timing is not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Posting entries (or stored vector entries for a full scan) read
    pub entries_visited: u64,
    /// Candidates whose exact score was computed
    pub candidates_scored: u64,
    /// Candidates rejected by an upper bound before full scoring
    pub candidates_pruned: u64,
    /// Whole blocks stepped over without reading their entries
    pub blocks_skipped: u64,
}

impl AddAssign for SearchStats {
    fn add_assign(&mut self, rhs: Self) {
        self.entries_visited += rhs.entries_visited;
        self.candidates_scored += rhs.candidates_scored;
        self.candidates_pruned += rhs.candidates_pruned;
        self.blocks_skipped += rhs.blocks_skipped;
    }
}

/// Ordered hits (highest score first) plus the work it took to find them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub hits: Vec<ScoredVector>,
    pub stats: SearchStats,
}

/// Entry for top-k heap
///
/// Ordered so that the *worst* hit compares greatest and sits on top of the
/// max-heap: lower score is worse, and among equal scores the larger id is
/// worse.
#[derive(Clone, Copy, Debug)]
pub struct HeapEntry {
    pub id: VectorId,
    pub score: Score,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded top-k collector
///
/// Keeps the k best hits under the total order (score desc, id asc). The
/// weakest kept hit sits on top for O(1) threshold lookup and O(log k)
/// eviction. No deduplication - each id must be inserted at most once.
pub struct ScoreCollector {
    heap: BinaryHeap<HeapEntry>,
    k: usize,
}

impl ScoreCollector {
    pub fn new(k: usize) -> Self {
        // Cap capacity to avoid allocation overflow for very large k
        let capacity = k.saturating_add(1).min(1_000_000);
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            k,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }

    /// Score of the weakest kept hit once full, 0.0 before
    #[inline]
    pub fn threshold(&self) -> Score {
        if self.is_full() {
            self.heap.peek().map(|e| e.score).unwrap_or(0.0)
        } else {
            0.0
        }
    }

    /// Insert a hit. Returns true if it is now part of the top-k.
    #[inline]
    pub fn insert(&mut self, id: VectorId, score: Score) -> bool {
        if self.k == 0 {
            return false;
        }
        let entry = HeapEntry { id, score };
        if self.heap.len() < self.k {
            self.heap.push(entry);
            return true;
        }
        match self.heap.peek_mut() {
            Some(mut worst) if entry < *worst => {
                *worst = entry;
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Hits sorted by score descending, then id ascending
    pub fn into_sorted_results(self) -> Vec<ScoredVector> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|e| ScoredVector {
                id: e.id,
                score: e.score,
            })
            .collect()
    }
}
