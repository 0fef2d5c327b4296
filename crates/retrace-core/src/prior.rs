//! Leading-group priors learned from a sample corpus.
//!
//! Real identifier populations are not uniform over the decimal space:
//! allocation happens in narrow bands, so the first few digits of observed
//! identifiers cluster into a small set of values. A [`PriorModel`] records
//! which leading groups (fixed-width decimal prefixes) actually occur in a
//! sample corpus, and the search engine uses it to skip candidates outside
//! those bands before paying for a checksum evaluation.
//!
//! This is a recall-reducing heuristic, not a correctness guarantee: a true
//! preimage whose group was never sampled will be pruned away. The engine
//! therefore counts every pruned candidate and reports the total, so the
//! operator can judge the completeness risk instead of inheriting it
//! silently. A model is immutable once built; a better corpus means a new
//! sampling pass.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use tracing::debug;

use crate::error::{Error, Result};
use crate::ident::{digit_len, pow10, Identifier};

/// Shape of the prior: which digit length qualifies and how wide a prefix
/// the grouping key takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorConfig {
    /// Exact digit length an identifier must have to qualify
    pub digit_len: u32,
    /// Width of the leading group in digits
    pub group_width: u32,
}

impl PriorConfig {
    /// Maximum digit length a prior can constrain
    pub const MAX_DIGIT_LEN: u32 = crate::ident::MAX_DIGITS as u32;

    /// Creates a validated configuration.
    ///
    /// The group width must fit inside the digit length, and the digit
    /// length must be representable.
    pub fn new(digit_len: u32, group_width: u32) -> Result<Self> {
        if digit_len == 0 || digit_len > Self::MAX_DIGIT_LEN {
            return Err(Error::PriorWidth {
                width: group_width,
                digit_len,
            });
        }
        if group_width == 0 || group_width > digit_len {
            return Err(Error::PriorWidth {
                width: group_width,
                digit_len,
            });
        }
        Ok(Self {
            digit_len,
            group_width,
        })
    }

    /// Divisor that truncates a qualifying identifier to its leading group
    #[inline]
    fn group_divisor(self) -> u64 {
        pow10(self.digit_len - self.group_width)
    }
}

/// An immutable allow-list of observed leading groups.
///
/// Built once from a sample corpus; safely shared read-only across search
/// workers.
#[derive(Debug, Clone)]
pub struct PriorModel {
    config: PriorConfig,
    /// Observed group -> number of corpus samples that carried it
    groups: BTreeMap<u64, u64>,
    sampled: u64,
    skipped: u64,
}

impl PriorModel {
    /// Builds a model from a corpus of observed identifiers.
    ///
    /// Samples whose digit length differs from the configured one carry no
    /// information about the constrained band; they are skipped and counted
    /// rather than rejected.
    pub fn from_samples(
        config: PriorConfig,
        samples: impl IntoIterator<Item = Identifier>,
    ) -> Self {
        let divisor = config.group_divisor();
        let mut groups: BTreeMap<u64, u64> = BTreeMap::new();
        let mut sampled = 0;
        let mut skipped = 0;

        for id in samples {
            if digit_len(id) != config.digit_len {
                skipped += 1;
                continue;
            }
            *groups.entry(id / divisor).or_insert(0) += 1;
            sampled += 1;
        }

        debug!(
            groups = groups.len(),
            sampled, skipped, "prior model built"
        );

        Self {
            config,
            groups,
            sampled,
            skipped,
        }
    }

    /// The configuration this model was built under
    pub fn config(&self) -> PriorConfig {
        self.config
    }

    /// Leading group of `id`, or `None` when its digit length disqualifies it
    #[inline]
    pub fn leading_group(&self, id: Identifier) -> Option<u64> {
        if digit_len(id) != self.config.digit_len {
            return None;
        }
        Some(id / self.config.group_divisor())
    }

    /// Whether `id` survives pruning: right digit length, observed group.
    #[inline]
    pub fn qualifies(&self, id: Identifier) -> bool {
        match self.leading_group(id) {
            Some(group) => self.groups.contains_key(&group),
            None => false,
        }
    }

    /// Observed groups with their sample counts, in ascending group order
    pub fn groups(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.groups.iter().map(|(&g, &c)| (g, c))
    }

    /// Number of distinct observed groups
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Samples that matched the configured digit length
    pub fn sampled(&self) -> u64 {
        self.sampled
    }

    /// Samples discarded for having the wrong digit length
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// True when no group was ever observed; such a model prunes everything
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Renders the model as Rust source for embedding in another system.
    ///
    /// The generated function lists every observed group exactly once in
    /// ascending numeric order and rejects everything else.
    pub fn decision_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "/// Allow-list of observed {}-digit leading groups over {}-digit identifiers.",
            self.config.group_width, self.config.digit_len
        );
        let _ = writeln!(
            out,
            "/// Generated from {} corpus samples; unlisted groups are rejected.",
            self.sampled
        );
        let _ = writeln!(out, "pub fn group_allowed(group: u64) -> bool {{");
        let _ = writeln!(out, "    match group {{");
        for (&group, &count) in &self.groups {
            let _ = writeln!(out, "        {group} => true, // {count} sample(s)");
        }
        let _ = writeln!(out, "        _ => false,");
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out, "}}");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLES: [u64; 5] = [
        3_461_560_000_000_001,
        3_461_570_000_000_002,
        3_493_070_000_000_003,
        3_493_120_000_000_004,
        3_546_920_000_000_005,
    ];

    fn model() -> PriorModel {
        let config = PriorConfig::new(16, 5).unwrap();
        PriorModel::from_samples(config, SAMPLES)
    }

    #[test]
    fn test_config_rejects_bad_widths() {
        assert!(PriorConfig::new(16, 0).is_err());
        assert!(PriorConfig::new(16, 17).is_err());
        assert!(PriorConfig::new(0, 1).is_err());
        assert!(PriorConfig::new(21, 5).is_err());
        assert!(PriorConfig::new(16, 16).is_ok());
    }

    #[test]
    fn test_groups_are_counted() {
        let model = model();
        let groups: Vec<(u64, u64)> = model.groups().collect();
        assert_eq!(
            groups,
            vec![(34615, 2), (34930, 1), (34931, 1), (35469, 1)]
        );
        assert_eq!(model.sampled(), 5);
        assert_eq!(model.skipped(), 0);
    }

    #[test]
    fn test_qualifies_requires_observed_group() {
        let model = model();
        // Same band as a sample.
        assert!(model.qualifies(3_461_569_999_999_999));
        // 16 digits, never-observed group.
        assert!(!model.qualifies(9_999_990_000_000_000));
        // Observed prefix digits but wrong total length.
        assert!(!model.qualifies(346_156_000_000_000));
        assert!(!model.qualifies(710));
    }

    #[test]
    fn test_wrong_length_samples_are_skipped() {
        let config = PriorConfig::new(16, 5).unwrap();
        let model = PriorModel::from_samples(config, [710u64, 3_461_560_000_000_001]);
        assert_eq!(model.sampled(), 1);
        assert_eq!(model.skipped(), 1);
        assert_eq!(model.group_count(), 1);
    }

    #[test]
    fn test_empty_model_prunes_everything() {
        let config = PriorConfig::new(16, 5).unwrap();
        let model = PriorModel::from_samples(config, std::iter::empty());
        assert!(model.is_empty());
        assert!(!model.qualifies(3_461_560_000_000_001));
    }

    #[test]
    fn test_decision_table_shape() {
        let table = model().decision_table();
        assert!(table.contains("pub fn group_allowed(group: u64) -> bool {"));
        assert!(table.contains("        34615 => true,"));
        assert!(table.contains("        _ => false,"));
        // Ascending order: each group appears after the previous one.
        let positions: Vec<usize> = [34615u64, 34930, 34931, 35469]
            .iter()
            .map(|g| table.find(&format!("        {g} => true")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        // Every group exactly once.
        assert_eq!(table.matches("=> true").count(), 4);
    }
}
