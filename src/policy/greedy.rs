// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::segment::{Segment, SegmentId};
use crate::HashMap;
use std::collections::BTreeSet;

/// Greedy: the victim is the closed segment with the fewest valid blocks
///
/// Keyed set ordered by `(valid_cnt, id)`; `update` re-keys the entry with
/// the segment's current count.
#[derive(Default)]
pub struct GreedyPolicy {
    set: BTreeSet<(usize, SegmentId)>,

    /// Cached key per segment, so stale entries can be removed exactly
    cached: HashMap<SegmentId, usize>,
}

impl GreedyPolicy {
    /// Creates an empty greedy policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, seg: &Segment) {
        if let Some(old) = self.cached.insert(seg.id, seg.valid_cnt) {
            self.set.remove(&(old, seg.id));
        }
        self.set.insert((seg.valid_cnt, seg.id));
    }

    pub(crate) fn remove(&mut self, seg: &Segment) {
        if let Some(cnt) = self.cached.remove(&seg.id) {
            self.set.remove(&(cnt, seg.id));
        }
    }

    pub(crate) fn update(&mut self, seg: &Segment) {
        let Some(cnt) = self.cached.get_mut(&seg.id) else {
            return;
        };
        self.set.remove(&(*cnt, seg.id));
        *cnt = seg.valid_cnt;
        self.set.insert((seg.valid_cnt, seg.id));
    }

    pub(crate) fn choose(&mut self) -> Option<SegmentId> {
        let &(cnt, seg) = self.set.iter().next()?;
        self.set.remove(&(cnt, seg));
        self.cached.remove(&seg);
        Some(seg)
    }

    pub(crate) fn len(&self) -> usize {
        self.set.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::store::SegmentStore;

    #[test]
    fn picks_min_valid_count_after_updates() {
        let mut store = SegmentStore::new(3, 4);
        let mut p = GreedyPolicy::new();

        let ids = (0..3)
            .map(|_| store.allocate().unwrap())
            .collect::<Vec<_>>();

        for (n, &id) in ids.iter().enumerate() {
            let seg = store.get_mut(id);
            for i in 0..4 {
                seg.slots[i] = crate::segment::BlockSlot {
                    key: i as u64,
                    valid: i < n + 2,
                    create_ts: 0,
                };
            }
            seg.write_ptr = 4;
            seg.valid_cnt = n + 2;
            p.add(store.get(id));
        }

        // ids[2] drops from 4 valid blocks to 1
        store.set_slot_invalid(ids[2], 0).unwrap();
        store.set_slot_invalid(ids[2], 1).unwrap();
        store.set_slot_invalid(ids[2], 2).unwrap();
        p.update(store.get(ids[2]));

        assert_eq!(Some(ids[2]), p.choose());
        assert_eq!(Some(ids[0]), p.choose());
        assert_eq!(Some(ids[1]), p.choose());
    }
}
