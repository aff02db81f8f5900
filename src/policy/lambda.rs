// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{ScoreEntry, SharedClock};
use crate::segment::store::SegmentStore;
use crate::segment::{Segment, SegmentId};
use crate::HashMap;
use std::collections::BTreeSet;

const VALIDATE_TOP: usize = 4;

/// Inverse invalidation-rate selection
///
/// Score is `-(S - valid_cnt) / max(1, age)`: segments whose blocks die
/// slowly (cold segments) score highest and are surrendered first.
pub struct LambdaPolicy {
    clock: SharedClock,
    blocks_per_segment: usize,
    set: BTreeSet<ScoreEntry>,
    cached: HashMap<SegmentId, f64>,
}

impl LambdaPolicy {
    /// Creates an empty lambda policy.
    #[must_use]
    pub fn new(clock: SharedClock, blocks_per_segment: usize) -> Self {
        Self {
            clock,
            blocks_per_segment,
            set: BTreeSet::new(),
            cached: HashMap::default(),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn score(&self, seg: &Segment) -> f64 {
        let age = seg.age(self.clock.now()).max(1) as f64;
        let invalid = (self.blocks_per_segment - seg.valid_cnt) as f64;
        -(invalid / age)
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
        let fresh = self.score(seg);
        let Some(score) = self.cached.get_mut(&seg.id) else {
            return;
        };
        self.set.remove(&ScoreEntry {
            score: *score,
            seg: seg.id,
        });

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::GcClock;
    use std::rc::Rc;

    #[test]
    fn slow_dying_segment_is_preferred() {
        let clock: SharedClock = Rc::new(GcClock::default());
        clock.set_now(1000);

        let mut store = SegmentStore::new(2, 8);
        let mut p = LambdaPolicy::new(clock, 8);

        // both lost 4 of 8 blocks, but `slow` took ten times longer to do so
        let mut mk = |create_ts: u64| {
            let id = store.allocate().unwrap();
            let seg = store.get_mut(id);
            for i in 0..8 {
                seg.slots[i] = crate::segment::BlockSlot {
                    key: i as u64,
                    valid: i < 4,
                    create_ts,
                };
            }
            seg.write_ptr = 8;
            seg.valid_cnt = 4;
            seg.create_ts = create_ts;
            id
        };

        let slow = mk(0);
        let fast = mk(900);

        p.add(store.get(slow));
        p.add(store.get(fast));

        assert_eq!(Some(slow), p.choose(&store));
    }
}
