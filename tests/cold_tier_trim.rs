mod common;

use common::{tiny_config, write_one};
use logcache_sim::OutputSinks;
use test_log::test;

#[test]
fn rewrite_after_eviction_trims_the_cold_copy_once() -> logcache_sim::Result<()> {
    let mut cache = logcache_sim::build_cache(tiny_config(4, 8), "fifo", OutputSinks::default())?;

    write_one(&mut cache, 0)?;

    // flood with unique keys until the segment holding key 0 gets evicted
    for key in 100..164u64 {
        write_one(&mut cache, key)?;
    }

    assert!(!cache.exists(0), "key 0 should have been evicted");
    assert_eq!(0, cache.cold_tier().trim_calls());

    let nand_before = cache.cold_tier().nand_pages();
    let host_before = cache.cold_tier().host_pages();

    // the rewrite invalidates the stale cold copy exactly once
    write_one(&mut cache, 0)?;
    assert_eq!(1, cache.cold_tier().trim_calls());
    assert_eq!(1, cache.counters().reinsert_blocks);

    // the rewrite itself went to the cache, not the cold tier
    assert_eq!(nand_before, cache.cold_tier().nand_pages());
    assert_eq!(host_before, cache.cold_tier().host_pages());

    // key 0 is resident again; another overwrite must not trim
    write_one(&mut cache, 0)?;
    assert_eq!(1, cache.cold_tier().trim_calls());

    cache.check_invariants()?;
    Ok(())
}

#[test]
fn unique_key_flood_never_trims() -> logcache_sim::Result<()> {
    let mut cache = logcache_sim::build_cache(tiny_config(4, 8), "fifo", OutputSinks::default())?;

    for key in 0..512u64 {
        write_one(&mut cache, key)?;
    }

    assert_eq!(0, cache.cold_tier().trim_calls());
    assert_eq!(0, cache.counters().reinsert_blocks);
    Ok(())
}
