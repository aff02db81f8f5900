// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::segment::{BlockKey, SegmentId};
use crate::HashMap;

/// Location of the live copy of a block
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Location {
    /// Segment holding the block
    pub segment: SegmentId,

    /// Slot index inside the segment
    pub slot: usize,
}

/// Block-to-location mapping plus the reinsertion ledger
///
/// For every entry `k -> (s, i)`, `s.slots[i]` holds `k` and is valid. A
/// `put` overrides any previous binding; the caller is responsible for
/// flipping the prior slot to invalid.
#[derive(Default)]
pub struct LocationIndex {
    map: HashMap<BlockKey, Location>,

    /// Logical time at which a key was last evicted to the cold tier
    evicted_at: HashMap<BlockKey, u64>,
}

impl LocationIndex {
    /// Looks up where the live copy of `key` resides.
    #[must_use]
    pub fn get(&self, key: BlockKey) -> Option<Location> {
        self.map.get(&key).copied()
    }

    /// Returns `true` if `key` has a live copy.
    #[must_use]
    pub fn contains(&self, key: BlockKey) -> bool {
        self.map.contains_key(&key)
    }

    /// Binds `key` to a slot, overriding any previous binding.
    pub fn put(&mut self, key: BlockKey, segment: SegmentId, slot: usize) {
        self.map.insert(key, Location { segment, slot });
    }

    /// Drops the binding of `key`.
    pub fn erase(&mut self, key: BlockKey) -> Option<Location> {
        self.map.remove(&key)
    }

    /// Amount of blocks currently resident in the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if no block is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Remembers when `key` left for the cold tier.
    pub fn record_eviction(&mut self, key: BlockKey, now: u64) {
        self.evicted_at.insert(key, now);
    }

    /// Takes the eviction timestamp of `key`, if it was ever evicted.
    ///
    /// Used to classify a write as a reinsertion.
    pub fn take_eviction(&mut self, key: BlockKey) -> Option<u64> {
        self.evicted_at.remove(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_overrides_previous_binding() {
        let mut index = LocationIndex::default();
        index.put(1, 0, 3);
        index.put(1, 2, 7);

        assert_eq!(
            Some(Location {
                segment: 2,
                slot: 7
            }),
            index.get(1)
        );
        assert_eq!(1, index.len());
    }

    #[test]
    fn eviction_ledger_is_take_once() {
        let mut index = LocationIndex::default();
        index.record_eviction(9, 100);

        assert_eq!(Some(100), index.take_eviction(9));
        assert_eq!(None, index.take_eviction(9));
    }
}
