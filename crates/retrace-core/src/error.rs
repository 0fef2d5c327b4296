//! Error types for the retrace-core library.
//!
//! This module provides comprehensive error handling using the `thiserror` crate,
//! with detailed error variants for different failure modes.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for retrace operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all retrace operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A value could not be parsed as a canonical decimal identifier
    #[error("malformed identifier: {reason}")]
    MalformedIdentifier {
        /// What made the value unparseable
        reason: String,
    },

    /// Search range is empty or not representable
    #[error("invalid search range: low {low} must be less than high {high}")]
    RangeInvalid {
        /// Inclusive lower bound of the rejected range
        low: u64,
        /// Exclusive upper bound of the rejected range
        high: u64,
    },

    /// A required input set contained no usable entries
    #[error("empty input: {context}")]
    EmptyInput {
        /// Which input turned out to be empty
        context: String,
    },

    /// Leading-group width incompatible with the configured digit length
    #[error("group width {width} must be between 1 and the digit length {digit_len}")]
    PriorWidth {
        /// Requested group width in digits
        width: u32,
        /// Configured identifier digit length
        digit_len: u32,
    },

    /// Low-part table width outside the buildable range
    #[error("split table width {width} must be between 1 and {max} digits")]
    TableWidth {
        /// Requested low-part width in digits
        width: u32,
        /// Largest width the table builder accepts
        max: u32,
    },

    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O failure on a stream without a path attached
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Known-identifier store failure
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl Error {
    /// Creates a new malformed-identifier error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedIdentifier {
            reason: reason.into(),
        }
    }

    /// Creates a new invalid-range error
    pub fn range_invalid(low: u64, high: u64) -> Self {
        Self::RangeInvalid { low, high }
    }

    /// Creates a new empty-input error
    pub fn empty_input(context: impl Into<String>) -> Self {
        Self::EmptyInput {
            context: context.into(),
        }
    }

    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this is a recoverable error that should be skipped
    ///
    /// File parsing treats malformed entries as skippable; everything else
    /// aborts the operation that produced it.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedIdentifier { .. })
    }
}
