//! Block posting list for the immutable index
//!
//! A posting list is cut into fixed-capacity blocks sorted by vector id.
//! Each block carries skip metadata (`first_id`, `last_id`) and `max_weight`,
//! a true upper bound on every weight it holds. The cursor uses the skip
//! metadata to jump over whole blocks and the block maxima to bound the
//! contribution of ids it has not read.

use crate::error::Result;
use crate::{TERMINATED, VectorId};

use super::posting::PostingEntry;

/// Default number of entries per block
pub const BLOCK_SIZE: usize = 128;

/// Smallest block capacity accepted by the builder
pub const MIN_BLOCK_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct PostingBlock {
    pub first_id: VectorId,
    pub last_id: VectorId,
    /// Maximum weight in this block (for Block-Max pruning)
    pub max_weight: f32,
    ids: Vec<VectorId>,
    weights: Vec<f32>,
}

impl PostingBlock {
    /// Build a block from a non-empty run of entries sorted by id
    pub fn from_entries(entries: &[PostingEntry]) -> Result<Self> {
        debug_assert!(!entries.is_empty());
        debug_assert!(entries.windows(2).all(|w| w[0].id < w[1].id));

        let mut ids = Vec::new();
        ids.try_reserve_exact(entries.len())?;
        let mut weights = Vec::new();
        weights.try_reserve_exact(entries.len())?;

        let mut max_weight = 0.0f32;
        for e in entries {
            ids.push(e.id);
            weights.push(e.weight);
            max_weight = max_weight.max(e.weight);
        }

        Ok(Self {
            first_id: ids[0],
            last_id: ids[ids.len() - 1],
            max_weight,
            ids,
            weights,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[VectorId] {
        &self.ids
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Maximum possible contribution of this block to a dot product
    #[inline]
    pub fn block_max_contribution(&self, query_weight: f32) -> f32 {
        query_weight * self.max_weight
    }
}

// ============================================================================
// BlockPostingList
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct BlockPostingList {
    blocks: Vec<PostingBlock>,
    len: usize,
    /// Global maximum weight across all blocks (for MaxScore pruning)
    global_max_weight: f32,
}

impl BlockPostingList {
    /// Create from id-sorted entries with configurable block size
    pub fn from_entries_with_block_size(
        entries: &[PostingEntry],
        block_size: usize,
    ) -> Result<Self> {
        let block_size = block_size.max(MIN_BLOCK_SIZE);
        let mut blocks = Vec::new();
        blocks.try_reserve_exact(entries.len().div_ceil(block_size))?;
        for chunk in entries.chunks(block_size) {
            blocks.push(PostingBlock::from_entries(chunk)?);
        }
        let global_max_weight = blocks.iter().map(|b| b.max_weight).fold(0.0f32, f32::max);

        Ok(Self {
            blocks,
            len: entries.len(),
            global_max_weight,
        })
    }

    /// Create from id-sorted entries with the default block size (128)
    pub fn from_entries(entries: &[PostingEntry]) -> Result<Self> {
        Self::from_entries_with_block_size(entries, BLOCK_SIZE)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[PostingBlock] {
        &self.blocks
    }

    pub fn global_max_weight(&self) -> f32 {
        self.global_max_weight
    }

    pub fn block_max_weight(&self, block_idx: usize) -> Option<f32> {
        self.blocks.get(block_idx).map(|b| b.max_weight)
    }

    pub fn cursor(&self) -> BlockCursor<'_> {
        BlockCursor::new(self)
    }

    /// All entries in id order
    pub fn decode_all(&self) -> Vec<PostingEntry> {
        self.blocks
            .iter()
            .flat_map(|b| {
                b.ids
                    .iter()
                    .zip(&b.weights)
                    .map(|(&id, &weight)| PostingEntry { id, weight })
            })
            .collect()
    }

    /// First block at or after `from` whose last id is >= target
    fn find_block(&self, from: usize, target: VectorId) -> usize {
        from + self.blocks[from..].partition_point(|b| b.last_id < target)
    }
}

// ============================================================================
// Cursor
// ============================================================================

/// Forward-only cursor over a [`BlockPostingList`]
///
/// Counts the entries it lands on and the blocks it jumps over without
/// reading, so callers can report how much work pruning saved.
pub struct BlockCursor<'a> {
    posting_list: &'a BlockPostingList,
    block_idx: usize,
    in_block_idx: usize,
    entries_visited: u64,
    blocks_skipped: u64,
}

impl<'a> BlockCursor<'a> {
    fn new(posting_list: &'a BlockPostingList) -> Self {
        Self {
            posting_list,
            block_idx: 0,
            in_block_idx: 0,
            entries_visited: u64::from(!posting_list.blocks.is_empty()),
            blocks_skipped: 0,
        }
    }

    #[inline]
    fn block(&self) -> Option<&'a PostingBlock> {
        self.posting_list.blocks.get(self.block_idx)
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.block_idx >= self.posting_list.blocks.len()
    }

    /// Current vector id, or TERMINATED
    #[inline]
    pub fn doc(&self) -> VectorId {
        self.block()
            .map(|b| b.ids[self.in_block_idx])
            .unwrap_or(TERMINATED)
    }

    #[inline]
    pub fn weight(&self) -> f32 {
        self.block()
            .map(|b| b.weights[self.in_block_idx])
            .unwrap_or(0.0)
    }

    pub fn advance(&mut self) -> VectorId {
        let Some(block) = self.block() else {
            return TERMINATED;
        };
        self.in_block_idx += 1;
        if self.in_block_idx >= block.len() {
            self.block_idx += 1;
            self.in_block_idx = 0;
        }
        if !self.is_exhausted() {
            self.entries_visited += 1;
        }
        self.doc()
    }

    /// Move to the first entry with id >= target
    pub fn seek(&mut self, target: VectorId) -> VectorId {
        let Some(block) = self.block() else {
            return TERMINATED;
        };
        if block.ids[self.in_block_idx] >= target {
            return self.doc();
        }

        if block.last_id < target {
            let next = self.posting_list.find_block(self.block_idx + 1, target);
            self.blocks_skipped += (next - self.block_idx - 1) as u64;
            self.block_idx = next;
            self.in_block_idx = 0;
        }

        if let Some(block) = self.block() {
            let from = self.in_block_idx;
            self.in_block_idx = from + block.ids[from..].partition_point(|&id| id < target);
            self.entries_visited += 1;
        }
        self.doc()
    }

    /// Upper bound on this list's weight for every id in `[target, end)`.
    ///
    /// Moves the block pointer (never the entry reads) past blocks that end
    /// before `target`. Returns `(0.0, doc)` when the cursor already sits past
    /// `target`, since nothing below its current id remains in the list.
    pub fn block_bound(&mut self, target: VectorId) -> (f32, VectorId) {
        let Some(block) = self.block() else {
            return (0.0, TERMINATED);
        };
        if block.last_id < target {
            let next = self.posting_list.find_block(self.block_idx + 1, target);
            self.blocks_skipped += (next - self.block_idx) as u64;
            self.block_idx = next;
            self.in_block_idx = 0;
        }
        let Some(block) = self.block() else {
            return (0.0, TERMINATED);
        };
        let doc = block.ids[self.in_block_idx];
        if doc > target {
            (0.0, doc)
        } else {
            (block.max_weight, block.last_id.saturating_add(1))
        }
    }

    pub fn current_block_max_weight(&self) -> f32 {
        self.block().map(|b| b.max_weight).unwrap_or(0.0)
    }

    pub fn entries_visited(&self) -> u64 {
        self.entries_visited
    }

    pub fn blocks_skipped(&self) -> u64 {
        self.blocks_skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(n: u32, step: u32, weight: impl Fn(u32) -> f32) -> Vec<PostingEntry> {
        (0..n)
            .map(|i| PostingEntry {
                id: i * step,
                weight: weight(i),
            })
            .collect()
    }

    #[test]
    fn test_block_max_weight() {
        let list = BlockPostingList::from_entries(&entries(300, 1, |i| i as f32 * 0.1)).unwrap();

        assert_eq!(list.len(), 300);
        assert_eq!(list.num_blocks(), 3);
        assert!((list.global_max_weight() - 29.9).abs() < 0.01);
        assert!((list.block_max_weight(0).unwrap() - 12.7).abs() < 0.01);
        assert!((list.block_max_weight(1).unwrap() - 25.5).abs() < 0.01);
        assert!((list.block_max_weight(2).unwrap() - 29.9).abs() < 0.01);

        for block in list.blocks() {
            assert!(block.weights().iter().all(|&w| w <= block.max_weight));
            assert_eq!(block.first_id, block.ids()[0]);
            assert_eq!(block.last_id, *block.ids().last().unwrap());
        }
    }

    #[test]
    fn test_cursor_iteration() {
        let source = entries(300, 2, |i| i as f32 * 0.1);
        let list = BlockPostingList::from_entries(&source).unwrap();

        let mut cursor = list.cursor();
        for expected in &source {
            assert_eq!(cursor.doc(), expected.id);
            assert!((cursor.weight() - expected.weight).abs() < 1e-6);
            cursor.advance();
        }
        assert_eq!(cursor.doc(), TERMINATED);
        assert_eq!(cursor.entries_visited(), 300);
        assert_eq!(list.decode_all(), source);
    }

    #[test]
    fn test_seek() {
        let list = BlockPostingList::from_entries(&entries(500, 3, |i| i as f32)).unwrap();

        let mut cursor = list.cursor();
        assert_eq!(cursor.seek(300), 300);
        assert_eq!(cursor.seek(301), 303);
        assert_eq!(cursor.seek(303), 303);
        assert_eq!(cursor.seek(1400), 1401);
        assert!(cursor.blocks_skipped() >= 1);
        assert_eq!(cursor.seek(2000), TERMINATED);
        assert!(cursor.is_exhausted());
        // seek is forward-only
        assert_eq!(cursor.seek(0), TERMINATED);
    }

    #[test]
    fn test_block_bound() {
        // ids 0, 2, 4, ..., 598; blocks of 128 entries
        let list =
            BlockPostingList::from_entries(&entries(300, 2, |i| if i == 200 { 5.0 } else { 1.0 }))
                .unwrap();

        let mut cursor = list.cursor();
        assert_eq!(cursor.block_bound(10), (1.0, 255));
        // block 1 holds ids 256..=510 and the 5.0 weight at id 400
        assert_eq!(cursor.block_bound(300), (5.0, 511));
        assert_eq!(cursor.blocks_skipped(), 1);
        // block_bound never reads entries
        assert_eq!(cursor.entries_visited(), 1);
        assert_eq!(cursor.seek(301), 302);
        assert_eq!(cursor.block_bound(301), (0.0, 302));
        assert_eq!(cursor.block_bound(10_000), (0.0, TERMINATED));
    }

    #[test]
    fn test_small_block_size_is_clamped() {
        let list =
            BlockPostingList::from_entries_with_block_size(&entries(40, 1, |_| 1.0), 4).unwrap();
        assert_eq!(list.num_blocks(), 3);
        assert!(BlockPostingList::from_entries(&[]).unwrap().is_empty());
    }
}
