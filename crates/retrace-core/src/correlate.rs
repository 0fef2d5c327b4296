//! Candidate files and correlation against the known-identifier corpus.
//!
//! A candidate file is the interchange format between the search phase and
//! the correlation phase: one identifier per line, `#`-prefixed comment
//! lines and blank lines ignored. Parsing is forgiving — a line that fails
//! to decode is skipped and counted, never fatal, so one stray artifact in
//! a multi-million-line dump does not discard the run.
//!
//! Correlation intersects a candidate set with the known-identifier store.
//! The report keeps the input cardinalities, so "ran and found nothing" is
//! distinguishable from "one of the inputs was empty".

use std::collections::BTreeSet;
use std::io::{BufRead, Write};

use tracing::{debug, trace};

use crate::error::Result;
use crate::ident::{decode, Identifier};
use crate::store::KnownIdentifierStore;

/// Parsed candidate set plus the count of unusable lines
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    /// Distinct parsed identifiers, ascending
    pub ids: BTreeSet<Identifier>,
    /// Lines skipped because they did not decode as identifiers
    pub skipped: u64,
}

/// Reads a candidate file.
///
/// Returns the parsed set together with the number of skipped lines;
/// only an I/O failure on the underlying reader is an error.
pub fn read_candidates<R: BufRead>(reader: R) -> Result<CandidateSet> {
    let mut set = CandidateSet::default();

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match decode(trimmed.as_bytes()) {
            Ok(id) => {
                set.ids.insert(id);
            }
            Err(err) => {
                trace!(line = trimmed, %err, "skipping unparseable candidate line");
                set.skipped += 1;
            }
        }
    }

    debug!(
        parsed = set.ids.len(),
        skipped = set.skipped,
        "candidate set loaded"
    );
    Ok(set)
}

/// Writes a candidate file: optional `#` header lines, then one identifier
/// per line in iteration order. Returns the number of identifiers written.
pub fn write_candidates<W: Write>(
    writer: &mut W,
    header: Option<&str>,
    ids: impl IntoIterator<Item = Identifier>,
) -> Result<u64> {
    if let Some(header) = header {
        for line in header.lines() {
            writeln!(writer, "# {line}")?;
        }
    }

    let mut written = 0;
    for id in ids {
        writeln!(writer, "{id}")?;
        written += 1;
    }
    Ok(written)
}

/// One correlated identifier with every provenance tag that sighted it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEntry {
    /// The identifier present in both inputs
    pub id: Identifier,
    /// All provenance labels the store holds for it, ascending
    pub sources: Vec<String>,
}

/// Outcome of a correlation run
#[derive(Debug, Clone)]
pub struct MatchReport {
    /// Matches in ascending identifier order
    pub entries: Vec<MatchEntry>,
    /// Size of the candidate input set
    pub candidate_count: u64,
    /// Size of the known-identifier store at correlation time
    pub known_count: u64,
}

impl MatchReport {
    /// True when either input set was empty — a zero-entry report with this
    /// flag set means nothing was intersected, not that nothing matched.
    pub fn empty_input(&self) -> bool {
        self.candidate_count == 0 || self.known_count == 0
    }

    /// Identifiers of all matches, ascending
    pub fn ids(&self) -> impl Iterator<Item = Identifier> + '_ {
        self.entries.iter().map(|entry| entry.id)
    }
}

/// Intersects a candidate set with the known-identifier store.
///
/// Membership is tested per candidate, which is equivalent to materializing
/// `store.all()` and intersecting; it just avoids pulling a large corpus
/// into memory for a small candidate set. Each match is annotated with
/// every provenance tag the store knows for it.
pub fn correlate(
    candidates: &BTreeSet<Identifier>,
    store: &dyn KnownIdentifierStore,
) -> Result<MatchReport> {
    let known_count = store.count()?;
    let mut entries = Vec::new();

    if known_count > 0 {
        for &id in candidates {
            if store.contains(id)? {
                entries.push(MatchEntry {
                    id,
                    sources: store.sources(id)?,
                });
            }
        }
    }

    debug!(
        matches = entries.len(),
        candidates = candidates.len(),
        known = known_count,
        "correlation complete"
    );

    Ok(MatchReport {
        entries,
        candidate_count: candidates.len() as u64,
        known_count,
    })
}
