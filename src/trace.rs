// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::io::BufRead;

/// Block I/O operation kind
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpType {
    /// Read; ignored by the write cache
    Read,

    /// Host write
    Write,

    /// Discard of a range
    Trim,
}

/// One parsed trace record, byte-granular
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Device the record was captured on
    pub dev_id: String,

    /// Operation
    pub op: OpType,

    /// Offset in bytes
    pub offset: u64,

    /// Size in bytes
    pub size: u64,

    /// Capture timestamp, seconds
    pub timestamp: f64,
}

/// Trace line format
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TraceFormat {
    /// `dev_id,op,offset_bytes,size_bytes,timestamp`
    #[default]
    Csv,

    /// blktrace text output; sectors are converted at 512 bytes each
    Blktrace,
}

impl std::str::FromStr for TraceFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "csv" => Ok(Self::Csv),
            "blktrace" => Ok(Self::Blktrace),
            _ => Err(crate::Error::Config(format!("unknown trace format: {s}"))),
        }
    }
}

const SECTOR_SIZE: u64 = 512;

fn parse_op(token: &str) -> Option<OpType> {
    // R/RS read, W/WS write; everything else is noise (flushes, metadata)
    match token.as_bytes().first() {
        Some(b'R') => Some(OpType::Read),
        Some(b'W') => Some(OpType::Write),
        _ => None,
    }
}

fn parse_csv(line: &str) -> Option<Record> {
    let mut fields = line.split(',').map(str::trim);

    let dev_id = fields.next()?.to_owned();
    let op = parse_op(fields.next()?)?;
    let offset = fields.next()?.parse().ok()?;
    let size = fields.next()?.parse().ok()?;
    let timestamp = fields.next()?.parse().ok()?;

    Some(Record {
        dev_id,
        op,
        offset,
        size,
        timestamp,
    })
}

fn parse_blktrace(line: &str) -> Option<Record> {
    let fields = line.split_whitespace().collect::<Vec<_>>();
    if fields.len() < 10 {
        return None;
    }

    let dev_id = (*fields.first()?).to_owned();
    let timestamp = fields.get(3)?.parse().ok()?;
    let op = parse_op(fields.get(6)?)?;
    let sector: u64 = fields.get(7)?.parse().ok()?;
    let sector_count: u64 = fields.get(9)?.parse().ok()?;

    Some(Record {
        dev_id,
        op,
        offset: sector * SECTOR_SIZE,
        size: sector_count * SECTOR_SIZE,
        timestamp,
    })
}

/// Lazy reader over a trace; yields records one line at a time
///
/// Blank lines and `#` comments are skipped silently; malformed rows are
/// skipped with a warning and counted, replay continues.
pub struct TraceReader<R: BufRead> {
    inner: std::io::Lines<R>,
    format: TraceFormat,
    line_no: u64,
    skipped: u64,
}

impl<R: BufRead> TraceReader<R> {
    /// Wraps a buffered reader in the given trace format.
    pub fn new(reader: R, format: TraceFormat) -> Self {
        Self {
            inner: reader.lines(),
            format,
            line_no: 0,
            skipped: 0,
        }
    }

    /// Amount of malformed rows skipped so far.
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = std::io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.inner.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let parsed = match self.format {
                TraceFormat::Csv => parse_csv(trimmed),
                TraceFormat::Blktrace => parse_blktrace(trimmed),
            };

            match parsed {
                Some(record) => return Some(Ok(record)),
                None => {
                    self.skipped += 1;
                    log::warn!("Skipping malformed trace row {}", self.line_no);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn csv_rows_parse() {
        let input = "0,W,8192,4096,1.5\n# comment\n\n0,RS,0,512,2.0\n";
        let reader = TraceReader::new(Cursor::new(input), TraceFormat::Csv);

        let records = reader.map(Result::unwrap).collect::<Vec<_>>();

        assert_eq!(2, records.len());
        assert_eq!(OpType::Write, records[0].op);
        assert_eq!(8_192, records[0].offset);
        assert_eq!(OpType::Read, records[1].op);
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let input = "0,W,8192,4096,1.5\ngarbage\n0,W,bad_offset,1,2\n0,W,0,4096,3.0\n";
        let mut reader = TraceReader::new(Cursor::new(input), TraceFormat::Csv);

        let mut count = 0;
        for item in reader.by_ref() {
            item.unwrap();
            count += 1;
        }

        assert_eq!(2, count);
        assert_eq!(2, reader.skipped());
    }

    #[test]
    fn blktrace_rows_convert_sectors() {
        //  maj,min cpu  seq   ts     pid  act  sector  +  count  proc
        let input = "8,0 1 1 0.000000 123 Q WS 2048 + 8 [fio]\n";
        let reader = TraceReader::new(Cursor::new(input), TraceFormat::Blktrace);

        let records = reader.map(Result::unwrap).collect::<Vec<_>>();

        assert_eq!(1, records.len());
        assert_eq!(OpType::Write, records[0].op);
        assert_eq!(2_048 * 512, records[0].offset);
        assert_eq!(8 * 512, records[0].size);
    }
}
