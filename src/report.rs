// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

/// Shared, injectable output sink
///
/// All human-readable output (stats lines, WAF samples, histogram dumps,
/// trace mirrors) goes through one of these, so tests can capture it.
pub type Sink = Rc<RefCell<dyn Write>>;

/// Wraps any writer into a [`Sink`].
pub fn sink<W: Write + 'static>(writer: W) -> Sink {
    Rc::new(RefCell::new(writer))
}

/// A sink that discards everything.
#[must_use]
pub fn null_sink() -> Sink {
    sink(std::io::sink())
}

/// Shared in-memory buffer for capturing output in tests.
#[must_use]
pub fn shared_buffer() -> Rc<RefCell<Vec<u8>>> {
    Rc::new(RefCell::new(Vec::new()))
}

/// A sink writing into a [`shared_buffer`].
#[must_use]
pub fn buffer_sink(buf: &Rc<RefCell<Vec<u8>>>) -> Sink {
    struct BufWriter(Rc<RefCell<Vec<u8>>>);

    impl Write for BufWriter {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    sink(BufWriter(buf.clone()))
}

/// Counters the cache exposes for reporting and tests
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheCounters {
    /// Bytes accepted into the cache (host writes)
    pub write_size_to_cache: u64,

    /// Bytes of host writes that overwrote a resident block
    pub write_hit_size: u64,

    /// Blocks surrendered to the cold tier (in units of cache blocks)
    pub evicted_blocks: u64,

    /// Blocks migrated into GC segments
    pub compacted_blocks: u64,

    /// Prior copies invalidated by overwrites
    pub invalidate_blocks: u64,

    /// Writes that returned after their key had been evicted
    pub reinsert_blocks: u64,

    /// Live blocks across all segments
    pub global_valid_blocks: u64,

    /// Partial-block write misses implying a fill read
    pub read_blocks_in_partial_write: u64,
}
