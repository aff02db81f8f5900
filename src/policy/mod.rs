// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod cost_benefit;
pub mod fifo;
pub mod greedy;
pub mod lambda;
pub mod multi_queue;
pub mod selective_fifo;

use crate::segment::{Segment, SegmentId};
use crate::segment::store::SegmentStore;
use crate::HashMap;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub use cost_benefit::{CostBenefitPolicy, KthCostBenefitPolicy};
pub use fifo::{FifoPolicy, FifoZeroPolicy};
pub use greedy::GreedyPolicy;
pub use lambda::LambdaPolicy;
pub use multi_queue::MultiQueuePolicy;
pub use selective_fifo::SelectiveFifoPolicy;

/// Context shared between the cache and its policies
///
/// The cache is the sole writer; policies read the logical time and the
/// age threshold published by the GC loop when they score segments.
#[derive(Default)]
pub struct GcClock {
    now: Cell<u64>,
    threshold: Cell<u64>,
}

impl GcClock {
    /// Logical time in appended blocks.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.now.get()
    }

    pub(crate) fn set_now(&self, now: u64) {
        self.now.set(now);
    }

    /// Age threshold last published by the GC loop.
    #[must_use]
    pub fn threshold(&self) -> u64 {
        self.threshold.get()
    }

    pub(crate) fn set_threshold(&self, threshold: u64) {
        self.threshold.set(threshold);
    }
}

/// Shared handle to the GC clock
pub type SharedClock = Rc<GcClock>;

/// Scores returned at or below this value keep a segment out of
/// rank-based selection.
pub(crate) const SKIP_SCORE: f64 = -1e300;

/// Victim scoring function, fixed into a policy at construction
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScoreFn {
    /// `age * (1 - u) / u`, the classic cost-benefit score (`u = 0` wins outright)
    AgeOverUtil,

    /// `-create_ts`: plain oldest-segment-first
    OldestFirst,

    /// `create_ts`, but segments with almost no invalid blocks are skipped
    NewestFull,

    /// `-valid_cnt`: emptiest-segment-first
    LeastValid,

    /// `(threshold - age) * (1 - u) / u`: prefer young segments
    HotFirst,

    /// `age * (1 - u) / u` against the published threshold window
    ColdFirst,

    /// `min(threshold - age, age) * (1 - u) / u`: prefer the middle of the window
    WarmFirst,
}

impl ScoreFn {
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn eval(self, seg: &Segment, blocks_per_segment: usize, clock: &GcClock) -> f64 {
        let age = seg.age(clock.now()) as f64;
        let u = seg.valid_cnt as f64 / blocks_per_segment as f64;
        let benefit = (1.0 - u) / (u + 1e-5);

        match self {
            Self::AgeOverUtil => {
                if seg.valid_cnt == 0 {
                    f64::INFINITY
                } else {
                    age * benefit
                }
            }
            Self::OldestFirst => -(seg.create_ts as f64),
            Self::NewestFull => {
                if seg.valid_cnt + 2 > blocks_per_segment {
                    SKIP_SCORE
                } else {
                    seg.create_ts as f64
                }
            }
            Self::LeastValid => -(seg.valid_cnt as f64),
            Self::HotFirst => (clock.threshold() as f64 - age) * benefit,
            Self::ColdFirst => age * benefit,
            Self::WarmFirst => (clock.threshold() as f64 - age).min(age) * benefit,
        }
    }
}

/// Entry of a score-ordered set; ascending order, so the best victim is `last()`
#[derive(Clone, Copy, Debug)]
pub(crate) struct ScoreEntry {
    pub score: f64,
    pub seg: SegmentId,
}

impl PartialEq for ScoreEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for ScoreEntry {}

impl PartialOrd for ScoreEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoreEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Segment id as the stable tie-break on equal scores
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.seg.cmp(&other.seg))
    }
}

/// Insertion-ordered queue with O(log n) removal by segment id
///
/// The building block of the FIFO-family policies.
#[derive(Default)]
pub(crate) struct FifoQueue {
    queue: BTreeMap<u64, SegmentId>,
    handle: HashMap<SegmentId, u64>,
    next_seq: u64,
}

impl FifoQueue {
    pub fn push_back(&mut self, seg: SegmentId) {
        // re-pushing moves the segment to the tail
        self.remove(seg);

        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert(seq, seg);
        self.handle.insert(seg, seq);
    }

    pub fn pop_front(&mut self) -> Option<SegmentId> {
        let (&seq, &seg) = self.queue.iter().next()?;
        self.queue.remove(&seq);
        self.handle.remove(&seg);
        Some(seg)
    }

    pub fn front(&self) -> Option<SegmentId> {
        self.queue.values().next().copied()
    }

    pub fn remove(&mut self, seg: SegmentId) -> bool {
        if let Some(seq) = self.handle.remove(&seg) {
            self.queue.remove(&seq);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, seg: SegmentId) -> bool {
        self.handle.contains_key(&seg)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// The victim-selection policies, one closed set
///
/// Dispatch happens at configuration time; the hot loop only matches on
/// an enum. All variants share one contract:
///
/// | operation  | semantics                                                    |
/// |------------|--------------------------------------------------------------|
/// | `add`      | segment was closed, register it for victim selection         |
/// | `remove`   | segment was reset, drop it (idempotent)                      |
/// | `update`   | a slot went invalid, reorder if needed (closed segments only)|
/// | `choose`   | pop and return the highest-priority victim                   |
///
/// `choose` removes the victim from the policy, so a caller that only
/// wanted to peek re-`add`s it.
pub enum VictimPolicy {
    /// Oldest closed segment first
    Fifo(FifoPolicy),

    /// FIFO, but fully-invalid segments drain first
    FifoZero(FifoZeroPolicy),

    /// Minimum valid count first
    Greedy(GreedyPolicy),

    /// Cached-score cost-benefit with top-K revalidation
    CostBenefit(CostBenefitPolicy),

    /// Rank-based cost-benefit over a score-ordered set
    KthCostBenefit(KthCostBenefitPolicy),

    /// Inverse invalidation-rate scoring
    Lambda(LambdaPolicy),

    /// Per-stream-class FIFO queues scanned in a configurable order
    SelectiveFifo(SelectiveFifoPolicy),

    /// Age-bucketed queues, oldest bucket first
    MultiQueue(MultiQueuePolicy),
}

impl VictimPolicy {
    /// Registers a freshly closed segment for victim selection.
    pub fn add(&mut self, seg: &Segment, now: u64) {
        match self {
            Self::Fifo(p) => p.add(seg),
            Self::FifoZero(p) => p.add(seg),
            Self::Greedy(p) => p.add(seg),
            Self::CostBenefit(p) => p.add(seg),
            Self::KthCostBenefit(p) => p.add(seg),
            Self::Lambda(p) => p.add(seg),
            Self::SelectiveFifo(p) => p.add(seg),
            Self::MultiQueue(p) => p.add(seg, now),
        }
    }

    /// Drops a chosen or reset segment; idempotent.
    pub fn remove(&mut self, seg: &Segment) {
        match self {
            Self::Fifo(p) => p.remove(seg),
            Self::FifoZero(p) => p.remove(seg),
            Self::Greedy(p) => p.remove(seg),
            Self::CostBenefit(p) => p.remove(seg),
            Self::KthCostBenefit(p) => p.remove(seg),
            Self::Lambda(p) => p.remove(seg),
            Self::SelectiveFifo(p) => p.remove(seg),
            Self::MultiQueue(p) => p.remove(seg),
        }
    }

    /// Reorders after a slot of a closed segment went invalid.
    pub fn update(&mut self, seg: &Segment) {
        match self {
            Self::Fifo(_) => {}
            Self::FifoZero(p) => p.update(seg),
            Self::Greedy(p) => p.update(seg),
            Self::CostBenefit(p) => p.update(seg),
            Self::KthCostBenefit(p) => p.update(seg),
            Self::Lambda(p) => p.update(seg),
            Self::SelectiveFifo(p) => p.update(seg),
            Self::MultiQueue(p) => p.update(seg),
        }
    }

    /// Pops the highest-priority victim, or `None` if the policy is empty.
    pub fn choose(&mut self, store: &SegmentStore) -> Option<SegmentId> {
        match self {
            Self::Fifo(p) => p.choose(),
            Self::FifoZero(p) => p.choose(),
            Self::Greedy(p) => p.choose(),
            Self::CostBenefit(p) => p.choose(store),
            Self::KthCostBenefit(p) => p.choose(store),
            Self::Lambda(p) => p.choose(store),
            Self::SelectiveFifo(p) => p.choose(store),
            Self::MultiQueue(p) => p.choose(),
        }
    }

    /// Picks the victim adjacent (next lower rank) to the previous choice.
    ///
    /// Only meaningful for the rank-based policy; everything else falls
    /// back to [`VictimPolicy::choose`].
    pub fn choose_adjacent(&mut self, store: &SegmentStore) -> Option<SegmentId> {
        match self {
            Self::KthCostBenefit(p) => p.choose_adjacent(store),
            _ => self.choose(store),
        }
    }

    /// Amount of registered segments.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Fifo(p) => p.len(),
            Self::FifoZero(p) => p.len(),
            Self::Greedy(p) => p.len(),
            Self::CostBenefit(p) => p.len(),
            Self::KthCostBenefit(p) => p.len(),
            Self::Lambda(p) => p.len(),
            Self::SelectiveFifo(p) => p.len(),
            Self::MultiQueue(p) => p.len(),
        }
    }

    /// Returns `true` if no segment is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
