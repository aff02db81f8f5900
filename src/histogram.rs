// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::report::Sink;
use std::io::Write;

/// Fixed-bucket counter for block ages and per-victim populations
///
/// Keys at or above `granularity * max_buckets` land in the last bucket.
/// Dropping the histogram dumps all non-empty buckets to its sink.
pub struct Histogram {
    name: String,
    granularity: u64,
    counts: Vec<u64>,
    sink: Sink,
}

impl Histogram {
    /// Creates a histogram of `max_buckets` buckets of width `granularity`.
    #[must_use]
    pub fn new(name: &str, granularity: u64, max_buckets: usize, sink: Sink) -> Self {
        debug_assert!(max_buckets > 0);

        Self {
            name: name.into(),
            granularity: granularity.max(1),
            counts: vec![0; max_buckets],
            sink,
        }
    }

    /// Adds `delta` to the bucket holding `key`.
    pub fn inc(&mut self, key: u64, delta: u64) {
        // NOTE: Truncation is OK, bucket counts are bounded by max_buckets
        #[allow(clippy::cast_possible_truncation)]
        let idx = ((key / self.granularity) as usize).min(self.counts.len() - 1);

        #[allow(clippy::indexing_slicing)]
        {
            self.counts[idx] += delta;
        }
    }
}

impl Drop for Histogram {
    fn drop(&mut self) {
        let mut sink = self.sink.borrow_mut();

        // Dump errors cannot be surfaced from a destructor
        let _ = writeln!(sink, "---summary of {}---", self.name);

        for (idx, count) in self.counts.iter().enumerate() {
            if *count > 0 {
                let _ = writeln!(sink, "{idx} {count}");
            }
        }

        let _ = sink.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report;

    fn dump_of(f: impl FnOnce(&mut Histogram)) -> String {
        let buf = report::shared_buffer();

        {
            let mut h = Histogram::new("ages", 10, 4, report::buffer_sink(&buf));
            f(&mut h);
        }

        let bytes = buf.borrow().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn bucketing_and_overflow() {
        let dump = dump_of(|h| {
            h.inc(0, 1); // bucket 0
            h.inc(9, 1); // bucket 0
            h.inc(10, 1); // bucket 1
            h.inc(1000, 5); // clamped to bucket 3
        });

        assert_eq!("---summary of ages---\n0 2\n1 1\n3 5\n", dump);
    }

    #[test]
    fn identical_input_identical_dump() {
        let run = || {
            dump_of(|h| {
                for key in [3u64, 17, 17, 39, 120] {
                    h.inc(key, 1);
                }
            })
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn empty_histogram_dumps_header_only() {
        let dump = dump_of(|_| {});
        assert_eq!("---summary of ages---\n", dump);
    }
}
