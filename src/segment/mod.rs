// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod store;

/// Key of a cache block (LBA divided by the cache block size)
pub type BlockKey = u64;

/// Index of a segment inside the preallocated pool
///
/// Segments never move, so an index is a stable, non-owning reference.
#[allow(clippy::module_name_repetitions)]
pub type SegmentId = u32;

/// First stream class reserved for GC-origin appends
///
/// Host streams live in `[0, GC_STREAM_START)`, GC streams above it.
pub const GC_STREAM_START: i32 = 40;

/// Maximum number of host stream classes
pub const MAX_STREAMS: i32 = 40;

/// Timestamp of a slot that never held a valid block
pub const NO_TIMESTAMP: u64 = u64::MAX;

/// One block slot inside a segment
#[derive(Clone, Copy, Debug)]
pub struct BlockSlot {
    /// Block key the slot was written for
    pub key: BlockKey,

    /// Whether the slot still holds the live copy of `key`
    pub valid: bool,

    /// Logical time at which the block was written (host or compacted)
    pub create_ts: u64,
}

impl Default for BlockSlot {
    fn default() -> Self {
        Self {
            key: 0,
            valid: false,
            create_ts: NO_TIMESTAMP,
        }
    }
}

/// An append-only cache segment, the unit of garbage collection
///
/// A segment becomes eligible for victim selection only once it is full
/// and has been handed to the policies.
#[derive(Debug)]
pub struct Segment {
    /// Position in the pool
    pub id: SegmentId,

    /// Block slots, fixed length
    pub slots: Vec<BlockSlot>,

    /// Next slot to write; monotonically increases until the segment is full
    pub write_ptr: usize,

    /// Count of slots with `valid = true`
    pub valid_cnt: usize,

    /// Logical time at which the segment became active
    ///
    /// Compaction pulls this back to the oldest migrated block.
    pub create_ts: u64,

    /// Stream class assigned on activation
    pub class_num: i32,
}

impl Segment {
    pub(crate) fn new(id: SegmentId, blocks_per_segment: usize) -> Self {
        Self {
            id,
            slots: vec![BlockSlot::default(); blocks_per_segment],
            write_ptr: 0,
            valid_cnt: 0,
            create_ts: 0,
            class_num: 0,
        }
    }

    /// Returns `true` if the write pointer has reached the end.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.write_ptr >= self.slots.len()
    }

    /// Fraction of slots holding live blocks.
    // NOTE: Precision is not important here
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn utilization(&self) -> f64 {
        self.valid_cnt as f64 / self.slots.len() as f64
    }

    /// Age of the segment at logical time `now`.
    #[must_use]
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.create_ts)
    }

    pub(crate) fn reset(&mut self) {
        self.write_ptr = 0;
        self.valid_cnt = 0;
        for slot in &mut self.slots {
            slot.valid = false;
        }
    }
}
