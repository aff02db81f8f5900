// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Default cache block size (4 KiB)
pub const DEFAULT_BLOCK_SIZE: u32 = 4_096;

/// Default segment size (32 MiB)
pub const DEFAULT_SEGMENT_BYTES: u64 = 32 * 1_024 * 1_024;

/// Default EWMA half-life, in appended blocks
pub const DEFAULT_HALF_LIFE_BLOCKS: f64 = 1_048_576.0;

/// Log cache configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Total cache capacity in bytes
    pub cache_bytes: u64,

    /// Cache block size in bytes
    pub block_size: u32,

    /// Segment size in bytes; the unit of GC
    pub segment_bytes: u64,

    /// GC runs until this fraction of segments is free
    pub free_ratio_low: f64,

    /// Eviction granularity in blocks (`W`); evictions write aligned
    /// `W`-block windows to the cold tier
    pub evicted_block_size: u64,

    /// Logical capacity of the cold tier in bytes
    pub cold_capacity: u64,

    /// Initial target fraction of cache blocks that should be live
    pub target_valid_ratio: f64,

    /// Upper bound the adaptive loop may push the target to
    pub valid_ratio_hard_limit: f64,

    /// Extra free-block share carved out by GC-time eviction
    pub additional_free_blks_ratio_by_gc: f64,

    /// Enables the ghost cache and the adaptive target loop
    pub ghost_cache: bool,

    /// Ghost cache capacity in keys; defaults to the cache block count
    pub ghost_capacity: Option<usize>,

    /// Batches of at least this many blocks bypass the cache straight to
    /// the cold tier; disabled by default
    pub bypass_batch_blocks: Option<usize>,

    /// Half-life of the rate EWMAs, in appended blocks
    pub half_life_blocks: f64,
}

impl Config {
    /// Creates a new configuration with default tuning.
    #[must_use]
    pub fn new(cache_bytes: u64, cold_capacity: u64) -> Self {
        Self {
            cache_bytes,
            block_size: DEFAULT_BLOCK_SIZE,
            segment_bytes: DEFAULT_SEGMENT_BYTES,
            free_ratio_low: 0.01,
            evicted_block_size: 1,
            cold_capacity,
            target_valid_ratio: 0.0,
            valid_ratio_hard_limit: 0.93,
            additional_free_blks_ratio_by_gc: 0.0,
            ghost_cache: false,
            ghost_capacity: None,
            bypass_batch_blocks: None,
            half_life_blocks: DEFAULT_HALF_LIFE_BLOCKS,
        }
    }

    /// Sets the cache block size.
    #[must_use]
    pub fn block_size(mut self, bytes: u32) -> Self {
        self.block_size = bytes;
        self
    }

    /// Sets the segment size.
    ///
    /// This heavily influences write amplification, as space reclamation
    /// works on a per-segment basis.
    #[must_use]
    pub fn segment_bytes(mut self, bytes: u64) -> Self {
        self.segment_bytes = bytes;
        self
    }

    /// Sets the initial target valid ratio.
    #[must_use]
    pub fn target_valid_ratio(mut self, ratio: f64) -> Self {
        self.target_valid_ratio = ratio;
        self
    }

    /// Sets the eviction window in blocks.
    #[must_use]
    pub fn evicted_block_size(mut self, blocks: u64) -> Self {
        self.evicted_block_size = blocks;
        self
    }

    /// Enables the ghost cache feedback loop.
    #[must_use]
    pub fn ghost_cache(mut self, enabled: bool) -> Self {
        self.ghost_cache = enabled;
        self
    }

    /// Sets the GC-time eviction headroom.
    #[must_use]
    pub fn additional_free_blks_ratio_by_gc(mut self, ratio: f64) -> Self {
        self.additional_free_blks_ratio_by_gc = ratio;
        self
    }

    /// Blocks per segment (`S`).
    #[must_use]
    pub fn blocks_per_segment(&self) -> usize {
        // NOTE: Truncation is OK, segments are far below usize::MAX blocks
        #[allow(clippy::cast_possible_truncation)]
        {
            (self.segment_bytes / u64::from(self.block_size)) as usize
        }
    }

    /// Amount of segments (`N`).
    #[must_use]
    pub fn segment_count(&self) -> usize {
        #[allow(clippy::cast_possible_truncation)]
        {
            (self.cache_bytes / self.segment_bytes) as usize
        }
    }

    /// Total cache capacity in blocks.
    #[must_use]
    pub fn total_blocks(&self) -> u64 {
        self.cache_bytes / u64::from(self.block_size)
    }

    /// Checks the configuration for consistency.
    ///
    /// # Errors
    ///
    /// Will return `Err(Config)` describing the first violated constraint.
    pub fn validate(&self) -> crate::Result<()> {
        let err = |msg: &str| Err(crate::Error::Config(msg.into()));

        if self.block_size == 0 {
            return err("block_size must be > 0");
        }
        if self.segment_bytes == 0 || self.segment_bytes % u64::from(self.block_size) != 0 {
            return err("segment_bytes must be a multiple of block_size");
        }
        if self.cache_bytes < self.segment_bytes || self.cache_bytes % self.segment_bytes != 0 {
            return err("cache size must be a multiple of segment_bytes");
        }
        if self.cold_capacity == 0 {
            return err("cold_capacity must be > 0");
        }
        if self.evicted_block_size == 0 {
            return err("evicted_block_size must be > 0");
        }
        if !(0.0..=1.0).contains(&self.target_valid_ratio)
            || !(0.0..=1.0).contains(&self.valid_ratio_hard_limit)
            || !(0.0..=1.0).contains(&self.free_ratio_low)
        {
            return err("ratios must lie in [0, 1]");
        }
        if self.half_life_blocks <= 0.0 {
            return err("half_life_blocks must be > 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let cfg = Config::new(1 << 30, 1 << 34);
        assert!(cfg.validate().is_ok());
        assert_eq!(8_192, cfg.blocks_per_segment());
        assert_eq!(32, cfg.segment_count());
    }

    #[test]
    fn misaligned_sizes_are_rejected() {
        let cfg = Config::new(1 << 30, 1 << 34).segment_bytes(1_000_000);
        assert!(matches!(cfg.validate(), Err(crate::Error::Config(_))));

        let cfg = Config::new(DEFAULT_SEGMENT_BYTES + 1, 1 << 34);
        assert!(matches!(cfg.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn zero_cold_capacity_is_rejected() {
        let cfg = Config::new(1 << 30, 0);
        assert!(matches!(cfg.validate(), Err(crate::Error::Config(_))));
    }
}
