//! Block-Max MaxScore top-k retrieval
//!
//! Provides:
//! - `ScoringIterator`: common interface for posting cursors that score
//! - `SparseTermScorer`: ScoringIterator over one dimension's block list
//! - `BlockMaxScoreExecutor`: document-at-a-time MaxScore with block-max
//!   bounds, exact under the (score desc, id asc) order

use log::{debug, trace};

use crate::structures::{BlockCursor, BlockPostingList, Tombstones};
use crate::{TERMINATED, VectorId};

use super::collector::{ScoreCollector, SearchResult, SearchStats};

/// Relative slack applied to upper bounds before comparing them with the
/// threshold. Bounds and exact scores are summed in different orders, so a
/// bound can round a few ulps below the score it bounds.
const BOUND_SLACK: f32 = 1e-4;

/// Whether a candidate bounded by `bound` could still enter a full top-k
/// whose weakest score is `threshold`.
///
/// Candidates arrive in ascending id order, so a candidate that only ties the
/// threshold loses the tie-break; only a strictly larger score enters.
#[inline]
fn can_beat(bound: f32, threshold: f32) -> bool {
    bound * (1.0 + BOUND_SLACK) >= threshold
}

/// Sum of every scorer's block bound at `target`, with the end of the id
/// range all of those blocks cover
fn block_upper<S: ScoringIterator>(
    scorers: &mut [S],
    target: VectorId,
    bounds: &mut [f32],
) -> (f32, VectorId) {
    let mut upper = 0.0f32;
    let mut region_end = TERMINATED;
    for (scorer, slot) in scorers.iter_mut().zip(bounds.iter_mut()) {
        let (bound, end) = scorer.block_bound(target);
        *slot = bound;
        upper += bound;
        region_end = region_end.min(end);
    }
    (upper, region_end)
}

/// Common interface for scoring cursors over one query dimension
pub trait ScoringIterator {
    /// Current vector id (TERMINATED if exhausted)
    fn doc(&self) -> VectorId;

    /// Advance to the next entry, returns the new id
    fn advance(&mut self) -> VectorId;

    /// Seek to the first entry with id >= target, returns the new id
    fn seek(&mut self, target: VectorId) -> VectorId;

    fn is_exhausted(&self) -> bool {
        self.doc() == TERMINATED
    }

    /// Score contribution for the current entry
    fn score(&self) -> f32;

    /// Maximum possible contribution of this dimension (global upper bound)
    fn max_score(&self) -> f32;

    /// Upper bound on the contribution of every id in `[target, end)`,
    /// returned as `(bound, end)` with `end > target`
    fn block_bound(&mut self, target: VectorId) -> (f32, VectorId);

    /// Entries read so far
    fn entries_visited(&self) -> u64;

    /// Blocks stepped over without reading
    fn blocks_skipped(&self) -> u64 {
        0
    }
}

/// Scorer for one sparse query dimension
///
/// Wraps a `BlockPostingList` cursor with the query weight for its dimension.
pub struct SparseTermScorer<'a> {
    cursor: BlockCursor<'a>,
    /// Query weight for this dimension
    query_weight: f32,
    /// Global max score (query_weight * global_max_weight)
    max_score: f32,
}

impl<'a> SparseTermScorer<'a> {
    pub fn new(posting_list: &'a BlockPostingList, query_weight: f32) -> Self {
        Self {
            cursor: posting_list.cursor(),
            query_weight,
            max_score: query_weight * posting_list.global_max_weight(),
        }
    }
}

impl ScoringIterator for SparseTermScorer<'_> {
    #[inline]
    fn doc(&self) -> VectorId {
        self.cursor.doc()
    }

    #[inline]
    fn advance(&mut self) -> VectorId {
        self.cursor.advance()
    }

    #[inline]
    fn seek(&mut self, target: VectorId) -> VectorId {
        self.cursor.seek(target)
    }

    #[inline]
    fn score(&self) -> f32 {
        // Dot product contribution: query_weight * stored_weight
        self.query_weight * self.cursor.weight()
    }

    #[inline]
    fn max_score(&self) -> f32 {
        self.max_score
    }

    #[inline]
    fn block_bound(&mut self, target: VectorId) -> (f32, VectorId) {
        let (max_weight, end) = self.cursor.block_bound(target);
        (self.query_weight * max_weight, end)
    }

    fn entries_visited(&self) -> u64 {
        self.cursor.entries_visited()
    }

    fn blocks_skipped(&self) -> u64 {
        self.cursor.blocks_skipped()
    }
}

/// Block-Max MaxScore executor for exact top-k retrieval
///
/// Scorers are kept in query-dimension order so exact scores are summed in
/// the same order as a merge dot product. Pruning works on two levels:
/// - MaxScore: scorers sorted by global bound; the cheapest prefix that
///   cannot beat the threshold on its own is non-essential and never
///   produces candidates, only gets probed
/// - Block-Max: before scoring a candidate, the block maxima of every
///   scorer bound it; a failing bound skips the whole id range those
///   blocks cover
pub struct BlockMaxScoreExecutor<'t, S: ScoringIterator> {
    /// Scorers in query-dimension order
    scorers: Vec<S>,
    collector: ScoreCollector,
    tombstones: Option<&'t Tombstones>,
}

impl<'t, S: ScoringIterator> BlockMaxScoreExecutor<'t, S> {
    pub fn new(scorers: Vec<S>, k: usize) -> Self {
        let total_upper: f32 = scorers.iter().map(|s| s.max_score()).sum();

        debug!(
            "Creating BlockMaxScoreExecutor: num_scorers={}, k={}, total_upper={:.4}",
            scorers.len(),
            k,
            total_upper
        );

        Self {
            scorers,
            collector: ScoreCollector::new(k),
            tombstones: None,
        }
    }

    /// Skip ids deleted after the posting lists were built
    pub fn with_tombstones(mut self, tombstones: &'t Tombstones) -> Self {
        self.tombstones = Some(tombstones);
        self
    }

    pub fn execute(mut self) -> SearchResult {
        let num_scorers = self.scorers.len();
        if num_scorers == 0 || self.collector.k() == 0 {
            debug!("BlockMaxScoreExecutor: nothing to score, returning empty results");
            return SearchResult::default();
        }

        let mut stats = SearchStats::default();

        // Scorer indices by ascending global bound, with prefix sums
        let mut order: Vec<usize> = (0..num_scorers).collect();
        order.sort_by(|&a, &b| {
            self.scorers[a]
                .max_score()
                .total_cmp(&self.scorers[b].max_score())
                .then(a.cmp(&b))
        });
        let mut prefix_upper = Vec::with_capacity(num_scorers + 1);
        prefix_upper.push(0.0f32);
        for &i in &order {
            let last = prefix_upper[prefix_upper.len() - 1];
            prefix_upper.push(last + self.scorers[i].max_score());
        }

        let mut num_non_essential = 0usize;
        let mut contributions = vec![0.0f32; num_scorers];
        let mut block_bounds = vec![0.0f32; num_scorers];

        loop {
            if self.collector.is_full() {
                let threshold = self.collector.threshold();
                while num_non_essential < num_scorers
                    && !can_beat(prefix_upper[num_non_essential + 1], threshold)
                {
                    num_non_essential += 1;
                }
                if num_non_essential == num_scorers {
                    debug!(
                        "Early termination: total_upper={:.4} cannot beat threshold={:.4}",
                        prefix_upper[num_scorers], threshold
                    );
                    break;
                }
            }

            let essential = &order[num_non_essential..];
            let candidate = essential
                .iter()
                .map(|&i| self.scorers[i].doc())
                .min()
                .unwrap_or(TERMINATED);
            if candidate == TERMINATED {
                break;
            }

            if self.tombstones.is_some_and(|t| t.is_dead(candidate)) {
                for &i in essential {
                    if self.scorers[i].doc() == candidate {
                        self.scorers[i].advance();
                    }
                }
                continue;
            }

            let threshold = self.collector.threshold();
            if self.collector.is_full() {
                let (upper, region_end) =
                    block_upper(&mut self.scorers, candidate, &mut block_bounds);

                if !can_beat(upper, threshold) {
                    // Nothing in [candidate, target) can beat the threshold;
                    // keep walking on block metadata alone
                    let mut target = region_end;
                    while target != TERMINATED {
                        let (upper, end) =
                            block_upper(&mut self.scorers, target, &mut block_bounds);
                        if can_beat(upper, threshold) {
                            break;
                        }
                        target = end;
                    }
                    trace!(
                        "Skip ids {}..{}: threshold={:.4}",
                        candidate,
                        target,
                        threshold
                    );
                    stats.candidates_pruned += 1;
                    for &i in essential {
                        self.scorers[i].seek(target);
                    }
                    continue;
                }
            }

            contributions.fill(0.0);
            let mut partial = 0.0f32;
            for &i in essential {
                if self.scorers[i].doc() == candidate {
                    let contribution = self.scorers[i].score();
                    contributions[i] = contribution;
                    partial += contribution;
                    self.scorers[i].advance();
                }
            }

            // Probe non-essential scorers, highest bound first. They only
            // exist once the collector is full, so block_bounds is current.
            let mut complete = true;
            if num_non_essential > 0 {
                let non_essential = &order[..num_non_essential];
                let mut remaining: f32 = non_essential.iter().map(|&i| block_bounds[i]).sum();
                for &i in non_essential.iter().rev() {
                    if !can_beat(partial + remaining, threshold) {
                        complete = false;
                        break;
                    }
                    remaining = (remaining - block_bounds[i]).max(0.0);
                    if self.scorers[i].seek(candidate) == candidate {
                        let contribution = self.scorers[i].score();
                        contributions[i] = contribution;
                        partial += contribution;
                    }
                }
            }

            if !complete {
                stats.candidates_pruned += 1;
                continue;
            }

            // Exact score, summed in query-dimension order
            let score = contributions.iter().fold(0.0f32, |acc, &c| acc + c);
            stats.candidates_scored += 1;

            let entered = self.collector.insert(candidate, score);
            trace!(
                "Vector {}: score={:.4}, threshold={:.4}, entered={}",
                candidate, score, threshold, entered
            );
        }

        for scorer in &self.scorers {
            stats.entries_visited += scorer.entries_visited();
            stats.blocks_skipped += scorer.blocks_skipped();
        }

        let hits = self.collector.into_sorted_results();

        debug!(
            "BlockMaxScoreExecutor completed: scored={}, pruned={}, visited={}, blocks_skipped={}, returned={}, top_score={:.4}",
            stats.candidates_scored,
            stats.candidates_pruned,
            stats.entries_visited,
            stats.blocks_skipped,
            hits.len(),
            hits.first().map(|h| h.score).unwrap_or(0.0)
        );

        SearchResult { hits, stats }
    }
}
