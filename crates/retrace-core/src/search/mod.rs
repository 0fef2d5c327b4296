//! Partitioned parallel enumeration of checksum preimages.
//!
//! The engine walks a half-open identifier range `[low, high)`, encodes each
//! candidate, evaluates the checksum, and emits every candidate that hits
//! the target. The range is split into contiguous disjoint sub-ranges, one
//! per worker thread; the only shared mutable state is the bounded result
//! channel and a handful of atomic counters. Candidate-set equality is the
//! invariant — emission order depends on worker interleaving and is not.
//!
//! Results are consumed lazily through the [`Search`] handle's iterator.
//! Dropping the handle (or calling [`Search::cancel`]) raises a cooperative
//! cancellation flag that workers check once per batch, so early consumers
//! never pay for the rest of the range. Ranges up to 10^16 are fine: the
//! space is enumerated, never materialized.
//!
//! When a [`PriorModel`] is supplied, candidates outside its observed bands
//! are skipped *before* the checksum is computed; that is the entire point
//! of pruning, and the skip count lands in [`SearchStats`] so the operator
//! can see what recall was traded away.

pub mod meet;

use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, trace};

use crate::checksum::crc32;
use crate::error::{Error, Result};
use crate::ident::{encode, Identifier};
use crate::prior::PriorModel;

/// A preimage: an identifier whose checksum equals the search target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchCandidate {
    /// The matching identifier
    pub id: Identifier,
}

/// Tuning knobs for a search run
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Worker threads (0 = one per available core)
    pub workers: usize,
    /// Candidates examined between cancellation checks and counter flushes
    pub batch: u64,
    /// Capacity of the result channel
    pub channel_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            batch: 4096,
            channel_capacity: 1024,
        }
    }
}

impl SearchConfig {
    /// Creates a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker thread count (0 = one per available core)
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the cancellation-check batch size
    pub fn batch(mut self, batch: u64) -> Self {
        self.batch = batch;
        self
    }

    /// Sets the result channel capacity
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }
}

#[derive(Debug, Default)]
struct StatsInner {
    examined: AtomicU64,
    pruned: AtomicU64,
    matched: AtomicU64,
}

/// Live counters for a search run.
///
/// Cheap to clone; all clones observe the same run. Counters are flushed by
/// workers once per batch, so mid-run reads are approximate by at most one
/// batch per worker; after the result stream ends they are exact.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    inner: Arc<StatsInner>,
}

impl SearchStats {
    /// Candidates enumerated so far (pruned ones included)
    pub fn examined(&self) -> u64 {
        self.inner.examined.load(Ordering::Relaxed)
    }

    /// Candidates skipped by the prior before checksum evaluation
    pub fn pruned(&self) -> u64 {
        self.inner.pruned.load(Ordering::Relaxed)
    }

    /// Candidates whose checksum hit the target
    pub fn matched(&self) -> u64 {
        self.inner.matched.load(Ordering::Relaxed)
    }

    fn add(&self, examined: u64, pruned: u64, matched: u64) {
        self.inner.examined.fetch_add(examined, Ordering::Relaxed);
        self.inner.pruned.fetch_add(pruned, Ordering::Relaxed);
        self.inner.matched.fetch_add(matched, Ordering::Relaxed);
    }
}

/// Handle over a running search: a lazy stream of [`MatchCandidate`].
///
/// Iterate to consume results as workers find them; stop at any time.
/// Dropping the handle cancels outstanding work and joins the workers.
pub struct Search {
    rx: Option<Receiver<MatchCandidate>>,
    cancel: Arc<AtomicBool>,
    stats: SearchStats,
    workers: Vec<JoinHandle<()>>,
    target: u32,
}

impl Search {
    /// Raises the cancellation flag; workers stop at their next batch edge.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Counters for this run
    pub fn stats(&self) -> SearchStats {
        self.stats.clone()
    }

    /// The checksum target being searched
    pub fn target(&self) -> u32 {
        self.target
    }
}

impl Iterator for Search {
    type Item = MatchCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.as_ref()?.recv().ok()
    }
}

impl Drop for Search {
    fn drop(&mut self) {
        self.cancel();
        // Disconnect the sink first so a worker blocked on a full channel
        // fails its send instead of waiting for a reader that left.
        self.rx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Starts a preimage search over `[range.start, range.end)`.
///
/// Returns [`Error::RangeInvalid`] when the range is empty. Repeated
/// invocations with the same range and target produce the same candidate
/// set; order may differ between runs and worker counts.
pub fn search(
    range: Range<Identifier>,
    target: u32,
    prior: Option<&PriorModel>,
    config: &SearchConfig,
) -> Result<Search> {
    if range.start >= range.end {
        return Err(Error::range_invalid(range.start, range.end));
    }

    let spans = partition(&range, config.effective_workers() as u64);
    let (tx, rx) = bounded(config.channel_capacity.max(1));
    let cancel = Arc::new(AtomicBool::new(false));
    let stats = SearchStats::default();
    let prior = prior.cloned().map(Arc::new);
    let batch = config.batch.max(1);

    debug!(
        low = range.start,
        high = range.end,
        checksum = format_args!("{target:08x}"),
        workers = spans.len(),
        pruning = prior.is_some(),
        "starting preimage search"
    );

    let workers = spans
        .into_iter()
        .map(|span| {
            let tx = tx.clone();
            let cancel = Arc::clone(&cancel);
            let stats = stats.clone();
            let prior = prior.clone();
            std::thread::spawn(move || run_worker(span, target, prior, tx, cancel, stats, batch))
        })
        .collect();
    drop(tx);

    Ok(Search {
        rx: Some(rx),
        cancel,
        stats,
        workers,
        target,
    })
}

/// Fully drained search: candidates sorted ascending plus final counters
#[derive(Debug, Clone)]
pub struct SearchReport {
    /// Every preimage found, ascending
    pub candidates: Vec<Identifier>,
    /// Candidates enumerated
    pub examined: u64,
    /// Candidates skipped by pruning
    pub pruned: u64,
}

/// Runs a search to completion and collects the result set.
pub fn search_collect(
    range: Range<Identifier>,
    target: u32,
    prior: Option<&PriorModel>,
    config: &SearchConfig,
) -> Result<SearchReport> {
    let mut engine = search(range, target, prior, config)?;
    let mut candidates: Vec<Identifier> = engine.by_ref().map(|c| c.id).collect();
    candidates.sort_unstable();

    let stats = engine.stats();
    Ok(SearchReport {
        candidates,
        examined: stats.examined(),
        pruned: stats.pruned(),
    })
}

/// Splits a range into at most `parts` contiguous, disjoint, covering spans
fn partition(range: &Range<u64>, parts: u64) -> Vec<Range<u64>> {
    let span = range.end - range.start;
    let parts = parts.clamp(1, span);
    let base = span / parts;
    let extra = span % parts;

    let mut out = Vec::with_capacity(parts as usize);
    let mut start = range.start;
    for i in 0..parts {
        let len = base + u64::from(i < extra);
        out.push(start..start + len);
        start += len;
    }
    out
}

fn run_worker(
    span: Range<u64>,
    target: u32,
    prior: Option<Arc<PriorModel>>,
    sender: Sender<MatchCandidate>,
    cancel: Arc<AtomicBool>,
    stats: SearchStats,
    batch: u64,
) {
    let mut next = span.start;
    while next < span.end {
        if cancel.load(Ordering::Relaxed) {
            trace!(at = next, end = span.end, "worker cancelled");
            return;
        }

        let stop = next.saturating_add(batch).min(span.end);
        let mut examined = 0u64;
        let mut pruned = 0u64;
        let mut matched = 0u64;

        for id in next..stop {
            examined += 1;
            if let Some(model) = prior.as_deref() {
                if !model.qualifies(id) {
                    pruned += 1;
                    continue;
                }
            }
            if crc32(encode(id).as_bytes()) == target {
                matched += 1;
                if sender.send(MatchCandidate { id }).is_err() {
                    // Receiver is gone; flush what we counted and stop.
                    stats.add(examined, pruned, matched);
                    return;
                }
            }
        }

        stats.add(examined, pruned, matched);
        next = stop;
    }
    trace!(start = span.start, end = span.end, "worker drained range");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prior::PriorConfig;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partition_covers_range() {
        let spans = partition(&(17..1000), 7);
        assert_eq!(spans.len(), 7);
        assert_eq!(spans.first().unwrap().start, 17);
        assert_eq!(spans.last().unwrap().end, 1000);
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        let total: u64 = spans.iter().map(|s| s.end - s.start).sum();
        assert_eq!(total, 983);
    }

    #[test]
    fn test_partition_never_exceeds_span() {
        let spans = partition(&(5..8), 16);
        assert_eq!(spans.len(), 3);
        assert!(spans.iter().all(|s| s.end - s.start == 1));
    }

    #[test]
    fn test_empty_range_is_rejected() {
        let config = SearchConfig::default();
        assert!(matches!(
            search(10..10, 0, None, &config),
            Err(Error::RangeInvalid { low: 10, high: 10 })
        ));
        assert!(search(50..10, 0, None, &config).is_err());
    }

    #[test]
    fn test_single_known_preimage() {
        let target = crc32(b"710");
        let report = search_collect(0..1000, target, None, &SearchConfig::default()).unwrap();
        assert_eq!(report.candidates, vec![710]);
        assert_eq!(report.examined, 1000);
        assert_eq!(report.pruned, 0);
    }

    #[test]
    fn test_zero_matches_is_a_clean_outcome() {
        let report =
            search_collect(0..1000, 0x338A_39A5, None, &SearchConfig::default()).unwrap();
        assert!(report.candidates.is_empty());
        assert_eq!(report.examined, 1000);
    }

    #[test]
    fn test_worker_count_does_not_change_the_set() {
        let target = crc32(b"54321");
        let one = search_collect(0..100_000, target, None, &SearchConfig::new().workers(1))
            .unwrap();
        let many = search_collect(0..100_000, target, None, &SearchConfig::new().workers(8))
            .unwrap();
        assert_eq!(one.candidates, many.candidates);
        assert_eq!(one.candidates, vec![54321]);
        assert_eq!(one.examined, many.examined);
    }

    #[test]
    fn test_prior_covering_the_preimage_keeps_the_set() {
        let target = crc32(b"710");
        let config = PriorConfig::new(3, 1).unwrap();
        let model = PriorModel::from_samples(config, [710u64]);

        let pruned = search_collect(0..1000, target, Some(&model), &SearchConfig::default())
            .unwrap();
        let full = search_collect(0..1000, target, None, &SearchConfig::default()).unwrap();

        assert_eq!(pruned.candidates, full.candidates);
        // Only the 3-digit identifiers in the 7xx band survive pruning.
        assert_eq!(pruned.pruned, 900);
    }

    #[test]
    fn test_prior_missing_the_preimage_loses_it() {
        let target = crc32(b"710");
        let config = PriorConfig::new(3, 1).unwrap();
        let model = PriorModel::from_samples(config, [123u64]);

        let report = search_collect(0..1000, target, Some(&model), &SearchConfig::default())
            .unwrap();
        assert!(report.candidates.is_empty());
        assert!(report.pruned > 0);
        assert_eq!(report.pruned, 900);
    }

    #[test]
    fn test_early_stop_cancels_workers() {
        let target = crc32(b"5");
        let mut engine = search(0..100_000_000, target, None, &SearchConfig::default()).unwrap();
        // Workers race, so the first arrival is any preimage, not necessarily 5.
        let first = engine.next().unwrap();
        assert_eq!(crc32(encode(first.id).as_bytes()), target);
        // Dropping the handle must not hang on the remaining range.
        drop(engine);
    }

    #[test]
    fn test_idempotent_reruns() {
        let target = crc32(b"4382");
        let a = search_collect(0..50_000, target, None, &SearchConfig::default()).unwrap();
        let b = search_collect(0..50_000, target, None, &SearchConfig::default()).unwrap();
        assert_eq!(a.candidates, b.candidates);
        assert_eq!(a.candidates, vec![4382]);
    }
}
