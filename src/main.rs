// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use clap::{Parser, ValueEnum};
use logcache_sim::{Config, OpType, OutputSinks, TraceFormat, TraceReader};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
enum RwPolicy {
    /// Replay reads and writes
    #[default]
    All,

    /// Replay writes only
    WriteOnly,

    /// Replay reads only
    ReadOnly,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
enum TraceFormatArg {
    #[default]
    Csv,
    Blktrace,
}

impl From<TraceFormatArg> for TraceFormat {
    fn from(value: TraceFormatArg) -> Self {
        match value {
            TraceFormatArg::Csv => Self::Csv,
            TraceFormatArg::Blktrace => Self::Blktrace,
        }
    }
}

/// Trace-driven log-structured write cache simulator
#[derive(Parser, Debug)]
#[command(name = "cache_sim", version, about)]
struct Cli {
    /// Block I/O trace to replay
    trace_file: PathBuf,

    /// Cache capacity in bytes
    cache_size_bytes: u64,

    /// Cache block size in bytes
    #[arg(long, default_value_t = 4_096)]
    block_size: u32,

    /// Which operations to replay
    #[arg(long, value_enum, default_value_t = RwPolicy::All)]
    rw_policy: RwPolicy,

    /// Trace line format
    #[arg(long, value_enum, default_value_t = TraceFormatArg::Csv)]
    trace_format: TraceFormatArg,

    /// Victim-selection preset (fifo, greedy, cost_benefit, ...)
    #[arg(long, default_value = "greedy")]
    cache_policy: String,

    /// Logical capacity of the cold tier in bytes
    #[arg(long)]
    cold_capacity: u64,

    /// Initial target valid ratio
    #[arg(long, default_value_t = 0.0)]
    valid_ratio: f64,

    /// WAF samples, one line per 10 GiB of cache writes
    #[arg(long)]
    waf_log_file: Option<PathBuf>,

    /// Stats lines and histogram dumps
    #[arg(long)]
    stat_log_file: Option<PathBuf>,

    /// Mirror of blocks accepted into the cache
    #[arg(long)]
    cache_trace: Option<PathBuf>,

    /// Mirror of writes reaching the cold tier
    #[arg(long)]
    cold_trace: Option<PathBuf>,
}

fn file_sink(path: Option<&PathBuf>) -> logcache_sim::Result<Option<logcache_sim::Sink>> {
    path.map(|p| File::create(p).map(logcache_sim::sink).map_err(Into::into))
        .transpose()
}

/// Splits a byte-granular request into block-aligned sub-writes carrying
/// their byte overlap.
fn split_into_blocks(offset: u64, size: u64, block_size: u32) -> BTreeMap<u64, u32> {
    let block_size = u64::from(block_size);
    let mut blocks = BTreeMap::new();

    if size == 0 {
        return blocks;
    }

    let req_end = offset + size;
    let start_block = offset / block_size;
    let end_block = req_end / block_size;

    for block in start_block..=end_block {
        let block_start = block * block_size;
        let block_end = block_start + block_size;

        let left = block_start.max(offset);
        let right = block_end.min(req_end);
        if right <= left {
            continue;
        }

        // NOTE: Truncation is OK, the overlap is at most one block
        #[allow(clippy::cast_possible_truncation)]
        blocks.insert(block, (right - left) as u32);
    }

    blocks
}

fn run(cli: &Cli) -> logcache_sim::Result<()> {
    let sinks = OutputSinks {
        waf: file_sink(cli.waf_log_file.as_ref())?,
        stats: file_sink(cli.stat_log_file.as_ref())?,
        cache_trace: file_sink(cli.cache_trace.as_ref())?,
        cold_trace: file_sink(cli.cold_trace.as_ref())?,
    };

    let config = Config::new(cli.cache_size_bytes, cli.cold_capacity)
        .block_size(cli.block_size)
        .target_valid_ratio(cli.valid_ratio);

    let mut cache = logcache_sim::build_cache(config, &cli.cache_policy, sinks)?;

    let trace = File::open(&cli.trace_file)?;
    let mut reader = TraceReader::new(BufReader::new(trace), cli.trace_format.into());

    let mut replayed: u64 = 0;

    while let Some(record) = reader.next() {
        let record = record?;

        let keep = match cli.rw_policy {
            RwPolicy::All => true,
            RwPolicy::WriteOnly => record.op == OpType::Write,
            RwPolicy::ReadOnly => record.op == OpType::Read,
        };
        if !keep {
            continue;
        }

        let blocks = split_into_blocks(record.offset, record.size, cache.block_size());
        cache.batch_insert(0, &blocks, record.op)?;
        replayed += 1;
    }

    if reader.skipped() > 0 {
        log::warn!("{} malformed trace rows skipped", reader.skipped());
    }

    cache.print_stats();

    let counters = cache.counters();
    let cold = cache.cold_tier();

    log::info!(
        "Replayed {replayed} records: {} bytes to cache, {} blocks evicted, cold WAF {:.3}",
        counters.write_size_to_cache,
        counters.evicted_blocks,
        cold.waf(),
    );

    Ok(())
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // help/version are not errors
            if e.use_stderr() {
                let _ = e.print();
                std::process::exit(1);
            }
            let _ = e.print();
            return;
        }
    };

    if let Err(e) = run(&cli) {
        eprintln!("cache_sim: {e}");
        std::process::exit(1);
    }
}
