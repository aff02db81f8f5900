// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::segment::SegmentId;

/// Represents errors that can occur in the cache simulator
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Invalid configuration (bad sizes, unknown policy name, ...)
    Config(String),

    /// GC could not produce a free segment
    ///
    /// Indicates the target valid ratio is too high, or the cache is too
    /// small for the workload.
    NoFreeSegment,

    /// Internal bookkeeping went out of sync
    InvariantViolation {
        /// What went wrong
        what: &'static str,

        /// The segment involved, if any
        segment: Option<SegmentId>,
    },

    /// Cold-tier GC could not reclaim any space (victim fully valid)
    ///
    /// Space must be reclaimed by upstream TRIM.
    ColdTierExhausted,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CacheSimError: {self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Cache simulator result
pub type Result<T> = std::result::Result<T, Error>;

macro_rules! invariant {
    ($cond:expr, $what:expr) => {
        if !$cond {
            return Err($crate::Error::InvariantViolation {
                what: $what,
                segment: None,
            });
        }
    };
    ($cond:expr, $what:expr, $seg:expr) => {
        if !$cond {
            return Err($crate::Error::InvariantViolation {
                what: $what,
                segment: Some($seg),
            });
        }
    };
}

pub(crate) use invariant;
