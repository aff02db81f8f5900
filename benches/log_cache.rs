use criterion::{criterion_group, criterion_main, Criterion};
use logcache_sim::{Config, OpType, OutputSinks};
use std::collections::BTreeMap;

const BLOCK: u32 = 4_096;

fn overwrite_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_insert");

    for policy in ["greedy", "cost_benefit", "greedy_cost_benefit"] {
        group.bench_function(policy, |b| {
            let segment_bytes = 256 * u64::from(BLOCK);
            let mut config = Config::new(16 * segment_bytes, 1 << 32).segment_bytes(segment_bytes);
            // headroom for the GC-stream active segments
            config.free_ratio_low = 0.25;

            let mut cache =
                logcache_sim::build_cache(config, policy, OutputSinks::default()).unwrap();

            let batches: Vec<BTreeMap<u64, u32>> = (0..64u64)
                .map(|i| (0..32u64).map(|k| (i * 17 + k * 3, BLOCK)).collect())
                .collect();
            let mut next = 0;

            b.iter(|| {
                cache
                    .batch_insert(0, &batches[next % batches.len()], OpType::Write)
                    .unwrap();
                next += 1;
            });
        });
    }

    group.finish();
}

criterion_group!(benches, overwrite_churn);
criterion_main!(benches);
