//! Split (meet-in-the-middle) search strategy.
//!
//! The linear scan pays one checksum per candidate. The split strategy
//! instead factors each identifier into a high part and a fixed-width low
//! part: precompute the checksum of every zero-padded low part once
//! ([`LowTable`]), then for each high part derive — via the GF(2)
//! zero-extension operator — the low-part checksum the target demands and
//! binary-search the table for it. A range of `10^(2w)` identifiers costs
//! roughly `10^w` table entries plus `10^w` lookups.
//!
//! Every hit is re-verified against the full checksum before it is emitted,
//! which makes the padding edge cases (a low part like `"05"` that only
//! exists inside a longer identifier) harmless: an assembled value whose
//! canonical form differs from the concatenation simply fails verification.
//!
//! Coverage: identifiers with at least `width` digits. Values shorter than
//! the table width have no padded decomposition; sweep those with the
//! linear scan, they are a vanishing fraction of any interesting range.

use std::ops::Range;

use tracing::debug;

use crate::checksum::{crc32, ZeroShift};
use crate::error::{Error, Result};
use crate::ident::{encode, pow10, Identifier};
use crate::prior::PriorModel;

use super::MatchCandidate;

/// Largest buildable low-part width (10^9 table entries)
pub const MAX_TABLE_WIDTH: u32 = 9;

#[derive(Debug, Clone, Copy)]
struct TableEntry {
    crc: u32,
    low: u32,
}

/// Precomputed checksums of every zero-padded `width`-digit low part,
/// sorted by checksum for binary search.
#[derive(Debug)]
pub struct LowTable {
    width: u32,
    entries: Vec<TableEntry>,
}

impl LowTable {
    /// Builds the table for the given low-part width.
    ///
    /// Costs `10^width` checksum evaluations plus a sort; width 8 (the
    /// sweet spot for 16-digit identifiers) is a few hundred megabytes and
    /// worth caching across searches within a process.
    pub fn build(width: u32) -> Result<Self> {
        if width == 0 || width > MAX_TABLE_WIDTH {
            return Err(Error::TableWidth {
                width,
                max: MAX_TABLE_WIDTH,
            });
        }

        let size = pow10(width);
        debug!(width, entries = size, "building low-part table");

        let mut buf = [0u8; MAX_TABLE_WIDTH as usize];
        let digits = &mut buf[..width as usize];
        let mut entries = Vec::with_capacity(size as usize);
        for low in 0..size {
            pad_digits(low, digits);
            entries.push(TableEntry {
                crc: crc32(digits),
                low: low as u32,
            });
        }
        entries.sort_unstable_by_key(|entry| entry.crc);

        Ok(Self { width, entries })
    }

    /// Low-part width in digits
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Collects every low part whose padded checksum equals `crc`
    fn lookup(&self, crc: u32, out: &mut Vec<u32>) {
        out.clear();
        let start = self.entries.partition_point(|entry| entry.crc < crc);
        for entry in &self.entries[start..] {
            if entry.crc != crc {
                break;
            }
            out.push(entry.low);
        }
    }
}

/// Writes `value` into `digits` as zero-padded decimal, lowest digit last
fn pad_digits(value: u64, digits: &mut [u8]) {
    let mut rest = value;
    for slot in digits.iter_mut().rev() {
        *slot = b'0' + (rest % 10) as u8;
        rest /= 10;
    }
}

/// Searches `[range.start, range.end)` for preimages of `target` using the
/// split strategy.
///
/// Agrees with the linear scan on every identifier of at least
/// `table.width()` digits; shorter identifiers are outside this strategy's
/// coverage. Results come back sorted ascending.
pub fn meet_search(
    range: Range<Identifier>,
    target: u32,
    table: &LowTable,
    prior: Option<&PriorModel>,
) -> Result<Vec<MatchCandidate>> {
    if range.start >= range.end {
        return Err(Error::range_invalid(range.start, range.end));
    }

    let width = table.width();
    let modulus = pow10(width);
    let shift = ZeroShift::for_len(u64::from(width));
    let mut out = Vec::new();
    let mut lows = Vec::new();

    let consider = |id: Identifier, out: &mut Vec<MatchCandidate>| {
        if !range.contains(&id) {
            return;
        }
        if let Some(model) = prior {
            if !model.qualifies(id) {
                return;
            }
        }
        if crc32(encode(id).as_bytes()) == target {
            out.push(MatchCandidate { id });
        }
    };

    // Identifiers with exactly `width` digits have no high part; their
    // canonical form IS the padded low part, so the target itself is the
    // lookup key. Shorter lows carry a padding zero and fail verification,
    // skip them up front.
    let min_exact = if width == 1 { 0 } else { pow10(width - 1) };
    table.lookup(target, &mut lows);
    for &low in &lows {
        let id = u64::from(low);
        if id >= min_exact {
            consider(id, &mut out);
        }
    }

    // High-part sweep: for each high part, the concatenation law fixes the
    // low-part checksum the target requires.
    let high_lo = (range.start / modulus).max(1);
    let high_hi = (range.end - 1) / modulus;
    for high in high_lo..=high_hi {
        let required = target ^ shift.apply(crc32(encode(high).as_bytes()));
        table.lookup(required, &mut lows);
        for &low in &lows {
            let Some(id) = high
                .checked_mul(modulus)
                .and_then(|base| base.checked_add(u64::from(low)))
            else {
                continue;
            };
            consider(id, &mut out);
        }
    }

    out.sort_unstable();
    out.dedup();

    let highs_swept = if high_hi >= high_lo {
        high_hi - high_lo + 1
    } else {
        0
    };
    debug!(found = out.len(), highs_swept, "split search complete");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_width_bounds() {
        assert!(LowTable::build(0).is_err());
        assert!(LowTable::build(MAX_TABLE_WIDTH + 1).is_err());
        assert!(LowTable::build(1).is_ok());
    }

    #[test]
    fn test_exact_width_identifier_is_found() {
        let table = LowTable::build(4).unwrap();
        let found = meet_search(0..10_000, crc32(b"4382"), &table, None).unwrap();
        assert_eq!(found, vec![MatchCandidate { id: 4382 }]);
    }

    #[test]
    fn test_high_low_decomposition_is_found() {
        let table = LowTable::build(2).unwrap();
        // 4382 splits into high 43, low 82.
        let found = meet_search(100..50_000, crc32(b"4382"), &table, None).unwrap();
        assert_eq!(found, vec![MatchCandidate { id: 4382 }]);
    }

    #[test]
    fn test_padded_low_part_with_leading_zero() {
        let table = LowTable::build(2).unwrap();
        // Low part "05" only exists inside the longer identifier.
        let target = crc32(b"4305");
        let found = meet_search(100..10_000, target, &table, None).unwrap();
        assert!(found.contains(&MatchCandidate { id: 4305 }));
        for candidate in &found {
            assert_eq!(crc32(encode(candidate.id).as_bytes()), target);
        }
    }

    #[test]
    fn test_range_bounds_are_respected() {
        let table = LowTable::build(2).unwrap();
        let found = meet_search(5000..50_000, crc32(b"4382"), &table, None).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_empty_range_is_rejected() {
        let table = LowTable::build(2).unwrap();
        assert!(meet_search(100..100, 0, &table, None).is_err());
    }

    #[test]
    fn test_prior_filters_split_results() {
        let table = LowTable::build(2).unwrap();
        let config = crate::prior::PriorConfig::new(4, 1).unwrap();
        let excludes = crate::prior::PriorModel::from_samples(config, [9_999u64]);
        let found =
            meet_search(100..50_000, crc32(b"4382"), &table, Some(&excludes)).unwrap();
        assert!(found.is_empty());
    }
}
