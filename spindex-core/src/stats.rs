//! Corpus and index statistics
//!
//! Computed from a consistent view without mutating anything. The posting
//! summary names the longest list, which is the "hot" dimension that
//! block-max pruning exists for.

use std::fmt;

use serde::Serialize;

use crate::DimId;
use crate::index::{ImmutableIndex, MutableIndex};
use crate::storage::Storage;

/// Shape of the stored vectors (live ones only)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorpusStats {
    pub vector_count: usize,
    pub live_count: usize,
    pub min_dim: Option<DimId>,
    pub max_dim: Option<DimId>,
    pub min_weight: Option<f32>,
    pub max_weight: Option<f32>,
    pub min_len: usize,
    pub max_len: usize,
    pub avg_len: f64,
}

impl CorpusStats {
    pub fn from_storage(storage: &Storage) -> Self {
        let mut stats = Self {
            vector_count: storage.len(),
            live_count: storage.live_count(),
            ..Self::default()
        };
        let mut total_len = 0usize;
        let mut min_len = usize::MAX;

        for (_, vector) in storage.iter() {
            let len = vector.len();
            total_len += len;
            min_len = min_len.min(len);
            stats.max_len = stats.max_len.max(len);

            // Entries are sorted by dimension
            if let (Some(first), Some(last)) = (vector.entries().first(), vector.entries().last()) {
                stats.min_dim = Some(stats.min_dim.map_or(first.dim_id, |d| d.min(first.dim_id)));
                stats.max_dim = Some(stats.max_dim.map_or(last.dim_id, |d| d.max(last.dim_id)));
            }
            for entry in vector.iter() {
                let w = entry.weight;
                stats.min_weight = Some(stats.min_weight.map_or(w, |m| m.min(w)));
                stats.max_weight = Some(stats.max_weight.map_or(w, |m| m.max(w)));
            }
        }

        if stats.live_count > 0 {
            stats.min_len = min_len;
            stats.avg_len = total_len as f64 / stats.live_count as f64;
        }
        stats
    }
}

/// One posting list in the summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PostingStats {
    pub dim_id: DimId,
    pub len: usize,
    pub max_weight: f32,
}

/// Longest and shortest lists; ties go to the smaller dimension
fn pick(
    lists: impl Iterator<Item = PostingStats>,
) -> (Option<PostingStats>, Option<PostingStats>) {
    let mut longest: Option<PostingStats> = None;
    let mut shortest: Option<PostingStats> = None;
    for p in lists {
        if longest.is_none_or(|l| p.len > l.len || (p.len == l.len && p.dim_id < l.dim_id)) {
            longest = Some(p);
        }
        if shortest.is_none_or(|s| (p.len, p.dim_id) < (s.len, s.dim_id)) {
            shortest = Some(p);
        }
    }
    (longest, shortest)
}

/// Snapshot part of the summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SnapshotStats {
    pub generation: u64,
    pub staleness: Option<u64>,
    pub dimension_count: usize,
    pub entry_count: usize,
    pub block_count: usize,
    pub block_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub corpus: CorpusStats,
    /// Dimensions with a posting list in the mutable index
    pub dimension_count: usize,
    /// Postings stored in the mutable index, deleted ones included
    pub entry_count: usize,
    pub longest_posting: Option<PostingStats>,
    pub shortest_posting: Option<PostingStats>,
    pub snapshot: Option<SnapshotStats>,
}

impl IndexStats {
    pub fn collect(
        storage: &Storage,
        mutable: &MutableIndex,
        snapshot: Option<&ImmutableIndex>,
    ) -> Self {
        let (longest_posting, shortest_posting) =
            pick(mutable.postings().map(|(dim_id, list)| PostingStats {
                dim_id,
                len: list.len(),
                max_weight: list.max_weight(),
            }));

        Self {
            corpus: CorpusStats::from_storage(storage),
            dimension_count: mutable.dimension_count(),
            entry_count: mutable.entry_count(),
            longest_posting,
            shortest_posting,
            snapshot: snapshot.map(|s| SnapshotStats {
                generation: s.generation(),
                staleness: None,
                dimension_count: s.dimension_count(),
                entry_count: s.entry_count(),
                block_count: s.block_count(),
                block_size: s.block_size(),
            }),
        }
    }

    pub fn with_staleness(mut self, staleness: Option<u64>) -> Self {
        if let Some(snapshot) = self.snapshot.as_mut() {
            snapshot.staleness = staleness;
        }
        self
    }
}

fn opt<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.corpus;
        writeln!(f, "vectors: {} ({} live)", c.vector_count, c.live_count)?;
        writeln!(f, "dimension range: {} .. {}", opt(c.min_dim), opt(c.max_dim))?;
        writeln!(f, "weight range: {} .. {}", opt(c.min_weight), opt(c.max_weight))?;
        writeln!(
            f,
            "vector length: min {}, max {}, avg {:.2}",
            c.min_len, c.max_len, c.avg_len
        )?;
        writeln!(
            f,
            "postings: {} dimensions, {} entries",
            self.dimension_count, self.entry_count
        )?;
        if let Some(p) = self.longest_posting {
            writeln!(
                f,
                "longest posting: dim {} ({} entries, max weight {})",
                p.dim_id, p.len, p.max_weight
            )?;
        }
        if let Some(p) = self.shortest_posting {
            writeln!(
                f,
                "shortest posting: dim {} ({} entries, max weight {})",
                p.dim_id, p.len, p.max_weight
            )?;
        }
        match self.snapshot {
            Some(s) => writeln!(
                f,
                "snapshot: generation {}, staleness {}, {} dimensions, {} entries in {} blocks of {}",
                s.generation,
                opt(s.staleness),
                s.dimension_count,
                s.entry_count,
                s.block_count,
                s.block_size
            ),
            None => writeln!(f, "snapshot: none"),
        }
    }
}
