//! Compacted, read-only index with block-max metadata
//!
//! Built wholesale from a [`MutableIndex`] or a [`Storage`] and never patched
//! afterwards. Deleted ids are dropped at build time; later deletes are
//! honored through [`ImmutableIndex::search_with_tombstones`].

use log::{debug, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::query::{BlockMaxScoreExecutor, SearchBackend, SearchResult, SparseTermScorer};
use crate::storage::Storage;
use crate::structures::{BlockPostingList, PostingEntry, SparseVector, Tombstones};
use crate::DimId;

use super::config::IndexConfig;
use super::mutable::MutableIndex;

#[derive(Debug, Clone, Default)]
pub struct ImmutableIndex {
    postings: FxHashMap<DimId, BlockPostingList>,
    block_size: usize,
    /// Ids below this were visible when the index was built
    vector_count: usize,
    live_count: usize,
    generation: u64,
}

/// Run `f` on a dedicated pool of `num_threads`, or on rayon's global pool
fn run_on_pool<R: Send>(num_threads: usize, f: impl FnOnce() -> R + Send) -> R {
    if num_threads == 0 {
        return f();
    }
    match rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|idx| format!("spindex-compact-{idx}"))
        .build()
    {
        Ok(pool) => pool.install(f),
        Err(e) => {
            warn!("Compaction pool unavailable ({}), using the global pool", e);
            f()
        }
    }
}

fn collect_postings(
    built: Vec<Option<(DimId, BlockPostingList)>>,
) -> Result<FxHashMap<DimId, BlockPostingList>> {
    let mut postings = FxHashMap::default();
    postings.try_reserve(built.len())?;
    postings.extend(built.into_iter().flatten());
    Ok(postings)
}

impl ImmutableIndex {
    /// Compact the live postings of `mutable` into blocks
    pub fn build(mutable: &MutableIndex, config: &IndexConfig) -> Result<Self> {
        let block_size = config.effective_block_size();
        let tombstones = mutable.tombstones();
        let lists: Vec<_> = mutable.postings().collect();

        let built = run_on_pool(config.num_threads, || {
            lists
                .par_iter()
                .map(|&(dim_id, list)| -> Result<Option<(DimId, BlockPostingList)>> {
                    let mut live = Vec::new();
                    live.try_reserve_exact(list.len())?;
                    live.extend(list.iter().filter(|p| tombstones.is_live(p.id)).copied());
                    if live.is_empty() {
                        return Ok(None);
                    }
                    let blocks = BlockPostingList::from_entries_with_block_size(&live, block_size)?;
                    Ok(Some((dim_id, blocks)))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let index = Self {
            postings: collect_postings(built)?,
            block_size,
            vector_count: mutable.vector_count(),
            live_count: mutable.live_count(),
            generation: 0,
        };
        debug!(
            "Built immutable index from mutable: dims={}, entries={}, live={}, block_size={}",
            index.dimension_count(),
            index.entry_count(),
            index.live_count,
            block_size
        );
        Ok(index)
    }

    /// Build the same index directly from storage
    pub fn from_storage(storage: &Storage, config: &IndexConfig) -> Result<Self> {
        let block_size = config.effective_block_size();

        let mut grouped: FxHashMap<DimId, Vec<PostingEntry>> = FxHashMap::default();
        for (id, vector) in storage.iter() {
            for entry in vector.iter() {
                let list = grouped.entry(entry.dim_id).or_default();
                list.try_reserve(1)?;
                list.push(PostingEntry {
                    id,
                    weight: entry.weight,
                });
            }
        }
        let lists: Vec<_> = grouped.into_iter().collect();

        let built = run_on_pool(config.num_threads, || {
            lists
                .par_iter()
                .map(|(dim_id, entries)| -> Result<Option<(DimId, BlockPostingList)>> {
                    let blocks =
                        BlockPostingList::from_entries_with_block_size(entries, block_size)?;
                    Ok(Some((*dim_id, blocks)))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let index = Self {
            postings: collect_postings(built)?,
            block_size,
            vector_count: storage.len(),
            live_count: storage.live_count(),
            generation: 0,
        };
        debug!(
            "Built immutable index from storage: dims={}, entries={}, live={}, block_size={}",
            index.dimension_count(),
            index.entry_count(),
            index.live_count,
            block_size
        );
        Ok(index)
    }

    /// Tag the index with the mutation count it reflects
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    fn scorers<'a>(&'a self, query: &SparseVector) -> Vec<SparseTermScorer<'a>> {
        query
            .iter()
            .filter_map(|q| {
                self.postings
                    .get(&q.dim_id)
                    .map(|list| SparseTermScorer::new(list, q.weight))
            })
            .collect()
    }

    /// Block-Max MaxScore top-`limit`
    pub fn search(&self, query: &SparseVector, limit: usize) -> SearchResult {
        BlockMaxScoreExecutor::new(self.scorers(query), limit).execute()
    }

    /// Like [`ImmutableIndex::search`], skipping ids deleted since the build
    pub fn search_with_tombstones(
        &self,
        query: &SparseVector,
        limit: usize,
        tombstones: &Tombstones,
    ) -> SearchResult {
        BlockMaxScoreExecutor::new(self.scorers(query), limit)
            .with_tombstones(tombstones)
            .execute()
    }

    /// Mutation count of the source when this index was built
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Ids covered by this index, including deleted ones
    pub fn vector_count(&self) -> usize {
        self.vector_count
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }

    pub fn posting(&self, dim_id: DimId) -> Option<&BlockPostingList> {
        self.postings.get(&dim_id)
    }

    /// All block lists, in no particular order
    pub fn postings(&self) -> impl Iterator<Item = (DimId, &BlockPostingList)> {
        self.postings.iter().map(|(&dim, list)| (dim, list))
    }

    pub fn dimension_count(&self) -> usize {
        self.postings.len()
    }

    pub fn entry_count(&self) -> usize {
        self.postings.values().map(|l| l.len()).sum()
    }

    pub fn block_count(&self) -> usize {
        self.postings.values().map(|l| l.num_blocks()).sum()
    }
}

impl SearchBackend for ImmutableIndex {
    fn search(&self, query: &SparseVector, limit: usize) -> SearchResult {
        ImmutableIndex::search(self, query, limit)
    }

    fn live_count(&self) -> usize {
        self.live_count
    }

    fn name(&self) -> &'static str {
        "immutable"
    }
}
