// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Segment, SegmentId};
use crate::error::invariant;
use std::collections::VecDeque;

/// Preallocated pool of segments plus the free list
///
/// Segments are created once at boot and never move or get destroyed, so a
/// [`SegmentId`] handed to a policy stays valid until the policy releases it.
#[allow(clippy::module_name_repetitions)]
pub struct SegmentStore {
    segments: Vec<Segment>,
    free: VecDeque<SegmentId>,
    blocks_per_segment: usize,
}

impl SegmentStore {
    /// Creates a pool of `segment_count` segments, all free.
    #[must_use]
    pub fn new(segment_count: usize, blocks_per_segment: usize) -> Self {
        // NOTE: Truncation is OK, the pool is bounded by the cache size
        #[allow(clippy::cast_possible_truncation)]
        let segments = (0..segment_count)
            .map(|id| Segment::new(id as SegmentId, blocks_per_segment))
            .collect::<Vec<_>>();

        #[allow(clippy::cast_possible_truncation)]
        let free = (0..segment_count as SegmentId).collect();

        Self {
            segments,
            free,
            blocks_per_segment,
        }
    }

    /// Returns the segment behind an id.
    #[must_use]
    pub fn get(&self, id: SegmentId) -> &Segment {
        // NOTE: Ids are only minted by this store, so they are always in range
        #[allow(clippy::indexing_slicing)]
        &self.segments[id as usize]
    }

    pub(crate) fn get_mut(&mut self, id: SegmentId) -> &mut Segment {
        #[allow(clippy::indexing_slicing)]
        &mut self.segments[id as usize]
    }

    /// Amount of segments in the pool.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Amount of segments currently on the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Blocks per segment (`S`).
    #[must_use]
    pub fn blocks_per_segment(&self) -> usize {
        self.blocks_per_segment
    }

    /// Pops a free segment.
    ///
    /// # Errors
    ///
    /// Will return `Err(NoFreeSegment)` if the free list is empty; the caller
    /// must have ensured GC ran beforehand.
    pub fn allocate(&mut self) -> crate::Result<SegmentId> {
        let id = self.free.pop_front().ok_or(crate::Error::NoFreeSegment)?;
        self.get_mut(id).reset();
        Ok(id)
    }

    /// Resets a segment and returns it to the free list.
    pub(crate) fn release(&mut self, id: SegmentId) -> crate::Result<()> {
        invariant!(
            !self.free.contains(&id),
            "segment released twice",
            id
        );
        self.get_mut(id).reset();
        self.free.push_back(id);
        Ok(())
    }

    /// Flips `slots[idx].valid` to false and decrements the valid count.
    ///
    /// Every invalidation goes through here so the valid count cannot drift.
    pub(crate) fn set_slot_invalid(&mut self, id: SegmentId, idx: usize) -> crate::Result<()> {
        let seg = self.get_mut(id);

        invariant!(idx < seg.write_ptr, "slot index beyond write pointer", id);

        #[allow(clippy::indexing_slicing)]
        let slot = &mut seg.slots[idx];

        invariant!(slot.valid, "slot invalidated twice", id);
        invariant!(seg.valid_cnt > 0, "valid count underflow", id);

        slot.valid = false;
        seg.valid_cnt -= 1;

        Ok(())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_allocate_release() -> crate::Result<()> {
        let mut store = SegmentStore::new(4, 8);
        assert_eq!(4, store.free_count());

        let a = store.allocate()?;
        let b = store.allocate()?;
        assert_ne!(a, b);
        assert_eq!(2, store.free_count());

        store.release(a)?;
        assert_eq!(3, store.free_count());

        assert!(matches!(
            store.release(a),
            Err(crate::Error::InvariantViolation { .. })
        ));

        Ok(())
    }

    #[test]
    fn store_exhaustion() -> crate::Result<()> {
        let mut store = SegmentStore::new(1, 8);
        store.allocate()?;
        assert!(matches!(store.allocate(), Err(crate::Error::NoFreeSegment)));
        Ok(())
    }

    #[test]
    fn slot_invalidation_is_single_shot() -> crate::Result<()> {
        let mut store = SegmentStore::new(1, 8);
        let id = store.allocate()?;

        {
            let seg = store.get_mut(id);
            seg.slots[0] = crate::segment::BlockSlot {
                key: 42,
                valid: true,
                create_ts: 0,
            };
            seg.write_ptr = 1;
            seg.valid_cnt = 1;
        }

        store.set_slot_invalid(id, 0)?;
        assert_eq!(0, store.get(id).valid_cnt);

        assert!(matches!(
            store.set_slot_invalid(id, 0),
            Err(crate::Error::InvariantViolation { .. })
        ));

        Ok(())
    }
}
