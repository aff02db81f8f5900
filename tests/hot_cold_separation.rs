mod common;

use common::{tiny_config, write_one};
use logcache_sim::OutputSinks;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use test_log::test;

/// 80/20 skew over 10k keys: hot keys re-resident quickly, cold keys not.
#[test]
fn hot_segments_drain_faster_than_cold_ones() -> logcache_sim::Result<()> {
    let mut cache =
        logcache_sim::build_cache(tiny_config(8, 8), "greedy_hotcold", OutputSinks::default())?;

    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..20_000 {
        let key = if rng.gen_bool(0.8) {
            // hot set small enough to stay resident
            rng.gen_range(0..48u64)
        } else {
            rng.gen_range(48..10_000u64)
        };
        write_one(&mut cache, key)?;
    }

    let stats = cache.collection_stats();
    let avg = |class: i32| {
        let s = stats.get(&class).copied().unwrap_or_default();
        assert!(s.segments >= 5, "class {class} barely collected: {s:?}");
        #[allow(clippy::cast_precision_loss)]
        {
            s.valid_blocks as f64 / s.segments as f64
        }
    };

    let hot_avg = avg(0);
    let cold_avg = avg(1);

    // hot (class 0) segments get invalidated by overwrites before
    // collection; cold (class 1) segments keep their blocks
    assert!(
        cold_avg > hot_avg * 1.1,
        "no separation: hot {hot_avg:.2} vs cold {cold_avg:.2}",
    );

    cache.check_invariants()?;
    Ok(())
}
