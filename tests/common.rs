use logcache_sim::{Config, LogCache, OpType};
use std::collections::BTreeMap;

#[allow(unused)]
pub const BLOCK: u32 = 4_096;

#[allow(unused)]
pub const COLD_CAPACITY: u64 = 1 << 30;

/// A cache of `segments` segments holding `blocks` blocks each.
///
/// Pools this small need a generous low-water mark, since GC-stream
/// activation draws from the same free list the GC loop refills.
#[allow(unused)]
pub fn tiny_config(segments: u64, blocks: u64) -> Config {
    let segment_bytes = blocks * u64::from(BLOCK);
    let mut cfg = Config::new(segments * segment_bytes, COLD_CAPACITY).segment_bytes(segment_bytes);
    cfg.free_ratio_low = 0.2;
    cfg
}

/// Writes one batch of full-block writes.
#[allow(unused)]
pub fn write_batch(
    cache: &mut LogCache,
    keys: impl IntoIterator<Item = u64>,
) -> logcache_sim::Result<()> {
    let batch: BTreeMap<u64, u32> = keys.into_iter().map(|k| (k, BLOCK)).collect();
    cache.batch_insert(0, &batch, OpType::Write)
}

/// Writes a single full block.
#[allow(unused)]
pub fn write_one(cache: &mut LogCache, key: u64) -> logcache_sim::Result<()> {
    write_batch(cache, [key])
}
