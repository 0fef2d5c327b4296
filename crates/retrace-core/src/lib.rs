//! # retrace-core
//!
//! A library for recovering the probable numeric identity behind a 32-bit
//! checksum by bounded preimage search and corpus correlation.
//!
//! This crate provides the core functionality for:
//! - Enumerating every identifier in a decimal range whose checksum equals
//!   a captured target (parallel linear scan or split strategy)
//! - Pruning the search space with leading-group priors learned from a
//!   sample of the real identifier population
//! - Correlating found preimages against a persisted corpus of identifiers
//!   known to exist, producing a ranked match report
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`checksum`]: The fixed CRC-32 function and GF(2) combine machinery
//! - [`ident`]: Canonical decimal encoding of identifiers
//! - [`prior`]: Leading-group priors and the generated allow-list table
//! - [`search`]: Parallel preimage enumeration and the split strategy
//! - [`correlate`]: Candidate files and store correlation
//! - [`store`]: Known-identifier persistence (memory and SQLite backends)
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use retrace_core::{search_collect, SearchConfig};
//!
//! // Every integer below five billion whose checksum is the target.
//! let report = search_collect(0..5_000_000_000, 0xB611_E159, None, &SearchConfig::default())?;
//! for id in &report.candidates {
//!     println!("{id}");
//! }
//! println!("examined {} candidates", report.examined);
//! # Ok::<(), retrace_core::Error>(())
//! ```
//!
//! ## Guarantees
//!
//! Search results are a set: re-running the same range and target yields the
//! same identifiers regardless of worker count, and every emitted candidate
//! verifies against the full checksum. Pruning is the one deliberate
//! exception — it trades recall for speed, and the engine reports exactly
//! how many candidates it skipped so the operator owns that tradeoff.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod checksum;
pub mod correlate;
pub mod error;
pub mod ident;
pub mod prior;
pub mod search;
pub mod store;

// Re-export primary types for convenience
pub use checksum::{combine, crc32, ZeroShift};
pub use correlate::{
    correlate, read_candidates, write_candidates, CandidateSet, MatchEntry, MatchReport,
};
pub use error::{Error, Result};
pub use ident::{decode, digit_len, encode, DigitBuf, Identifier, MAX_DIGITS};
pub use prior::{PriorConfig, PriorModel};
pub use search::meet::{meet_search, LowTable, MAX_TABLE_WIDTH};
pub use search::{
    search, search_collect, MatchCandidate, Search, SearchConfig, SearchReport, SearchStats,
};
pub use store::{KnownIdentifier, KnownIdentifierStore, MemoryStore, SqliteStore};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
