// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{ScoreEntry, ScoreFn, SharedClock, SKIP_SCORE};
use crate::segment::store::SegmentStore;
use crate::segment::{Segment, SegmentId};
use crate::HashMap;
use std::collections::BTreeSet;

/// How many top entries `choose` re-scores before giving up on cached order
const VALIDATE_TOP: usize = 10;

/// Cost-benefit victim selection with cached scores
///
/// Scores age continuously, so the ordered set holds scores as of the last
/// add/update. `choose` revalidates the cached top: if its fresh score still
/// matches, it wins; otherwise the entry is re-keyed and the next one is
/// tried, up to [`VALIDATE_TOP`] rounds.
pub struct CostBenefitPolicy {
    score_fn: ScoreFn,
    clock: SharedClock,
    blocks_per_segment: usize,
    set: BTreeSet<ScoreEntry>,
    cached: HashMap<SegmentId, f64>,
}

impl CostBenefitPolicy {
    /// Creates a cost-benefit policy scoring with `score_fn`.
    #[must_use]
    pub fn new(score_fn: ScoreFn, clock: SharedClock, blocks_per_segment: usize) -> Self {
        Self {
            score_fn,
            clock,
            blocks_per_segment,
            set: BTreeSet::new(),
            cached: HashMap::default(),
        }
    }

    fn score(&self, seg: &Segment) -> f64 {
        self.score_fn.eval(seg, self.blocks_per_segment, &self.clock)
    }

    pub(crate) fn add(&mut self, seg: &Segment) {
        let score = self.score(seg);
        if let Some(old) = self.cached.insert(seg.id, score) {
            self.set.remove(&ScoreEntry {
                score: old,
                seg: seg.id,
            });
        }
        self.set.insert(ScoreEntry { score, seg: seg.id });
    }

    pub(crate) fn remove(&mut self, seg: &Segment) {
        if let Some(score) = self.cached.remove(&seg.id) {
            self.set.remove(&ScoreEntry { score, seg: seg.id });
        }
    }

    pub(crate) fn update(&mut self, seg: &Segment) {
        let Some(score) = self.cached.get_mut(&seg.id) else {
            return;
        };
        self.set.remove(&ScoreEntry {
            score: *score,
            seg: seg.id,
        });

        let fresh = self.score_fn.eval(seg, self.blocks_per_segment, &self.clock);
        *score = fresh;
        self.set.insert(ScoreEntry {
            score: fresh,
            seg: seg.id,
        });
    }

    pub(crate) fn choose(&mut self, store: &SegmentStore) -> Option<SegmentId> {
        for _ in 0..VALIDATE_TOP {
            let top = *self.set.last()?;
            let fresh = self.score(store.get(top.seg));

            if fresh == top.score {
                break;
            }

            // score drifted: re-key and look again
            self.set.remove(&top);
            self.set.insert(ScoreEntry {
                score: fresh,
                seg: top.seg,
            });
            self.cached.insert(top.seg, fresh);
        }

        let top = *self.set.last()?;
        self.set.remove(&top);
        self.cached.remove(&top.seg);
        Some(top.seg)
    }

    pub(crate) fn len(&self) -> usize {
        self.set.len()
    }
}

/// Rank-based cost-benefit selection over a score-ordered set
///
/// `choose` does not take the best-scored segment but the one at rank
/// `numerator * n / denominator` (rank 0 = highest score), which lets a
/// compactor deliberately pick mid-field segments. The previous rank is
/// remembered so an adjacent (next lower rank) victim can be requested.
pub struct KthCostBenefitPolicy {
    score_fn: ScoreFn,
    clock: SharedClock,
    blocks_per_segment: usize,
    rank_numerator: usize,
    rank_denominator: usize,
    set: BTreeSet<ScoreEntry>,
    cached: HashMap<SegmentId, f64>,
    last_rank: usize,
}

impl KthCostBenefitPolicy {
    /// Creates a rank-based policy choosing at `numerator * n / denominator`.
    ///
    /// # Panics
    ///
    /// Panics if `rank_denominator` is zero.
    #[must_use]
    pub fn new(
        score_fn: ScoreFn,
        rank_numerator: usize,
        rank_denominator: usize,
        clock: SharedClock,
        blocks_per_segment: usize,
    ) -> Self {
        assert!(rank_denominator > 0, "invalid rank fraction");

        Self {
            score_fn,
            clock,
            blocks_per_segment,
            rank_numerator,
            rank_denominator,
            set: BTreeSet::new(),
            cached: HashMap::default(),
            last_rank: 0,
        }
    }

    fn score(&self, seg: &Segment) -> f64 {
        self.score_fn.eval(seg, self.blocks_per_segment, &self.clock)
    }

    pub(crate) fn add(&mut self, seg: &Segment) {
        if self.cached.contains_key(&seg.id) {
            return;
        }

        let score = self.score(seg);
        if score <= SKIP_SCORE {
            return;
        }

        self.set.insert(ScoreEntry { score, seg: seg.id });
        self.cached.insert(seg.id, score);
    }

    pub(crate) fn remove(&mut self, seg: &Segment) {
        if let Some(score) = self.cached.remove(&seg.id) {
            self.set.remove(&ScoreEntry { score, seg: seg.id });
        }
    }

    pub(crate) fn update(&mut self, seg: &Segment) {
        let Some(&score) = self.cached.get(&seg.id) else {
            // segments can reappear after a GC round dropped them
            self.add(seg);
            return;
        };

        self.set.remove(&ScoreEntry { score, seg: seg.id });

        let fresh = self.score(seg);
        self.cached.insert(seg.id, fresh);
        self.set.insert(ScoreEntry {
            score: fresh,
            seg: seg.id,
        });
    }

    fn take_at_rank(&mut self, rank: usize) -> Option<SegmentId> {
        // rank 0 = highest score = end of the ascending set
        let entry = *self.set.iter().rev().nth(rank)?;

        self.set.remove(&entry);
        self.cached.remove(&entry.seg);
        self.last_rank = rank;

        Some(entry.seg)
    }

    pub(crate) fn choose(&mut self, _store: &SegmentStore) -> Option<SegmentId> {
        if self.set.is_empty() {
            return None;
        }

        let rank =
            (self.rank_numerator * self.set.len() / self.rank_denominator).min(self.set.len() - 1);
        self.take_at_rank(rank)
    }

    /// Picks the segment one rank above the previous victim.
    pub(crate) fn choose_adjacent(&mut self, store: &SegmentStore) -> Option<SegmentId> {
        if self.last_rank == 0 {
            return self.choose(store);
        }
        self.take_at_rank(self.last_rank - 1)
    }

    pub(crate) fn len(&self) -> usize {
        self.set.len()
    }
}
