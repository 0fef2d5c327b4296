//! retrace - Recover numeric identities behind 32-bit checksums
//!
//! This tool searches a bounded decimal-identifier space for values whose
//! checksum matches a captured target, optionally prunes the space with
//! priors learned from a sample corpus, and correlates the resulting
//! candidates against a persisted store of identifiers known to exist.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use retrace_core::{
    correlate, meet_search, read_candidates, search, write_candidates, CandidateSet,
    KnownIdentifier, KnownIdentifierStore, LowTable, PriorConfig, PriorModel, SearchConfig,
    SqliteStore,
};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Recover numeric identities behind 32-bit checksums
#[derive(Parser, Debug)]
#[command(name = "retrace")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search an identifier range for preimages of a target checksum
    Search(SearchArgs),
    /// Build a leading-group prior from a sample corpus and inspect it
    Prior(PriorArgs),
    /// Intersect a candidate file with the known-identifier store
    Correlate(CorrelateArgs),
    /// Load identifier files into the known-identifier store
    Import(ImportArgs),
    /// Dump the known-identifier store in candidate-file format
    Export(ExportArgs),
}

/// How the range is enumerated
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    /// Parallel linear scan; covers any range
    Scan,
    /// Split (meet-in-the-middle) table search; covers identifiers of at
    /// least the table width
    Meet,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Target checksum in hex, with or without a 0x prefix
    #[arg(short, long, value_parser = parse_checksum)]
    target: u32,

    /// Inclusive lower bound of the identifier range
    #[arg(long, default_value = "0")]
    low: u64,

    /// Exclusive upper bound of the identifier range
    #[arg(long)]
    high: u64,

    /// Search strategy
    #[arg(long, value_enum, default_value = "scan")]
    strategy: Strategy,

    /// Low-part digit width for the meet strategy
    #[arg(long, default_value = "8")]
    meet_width: u32,

    /// Worker threads for the scan strategy (0 = one per core)
    #[arg(long, default_value = "0")]
    workers: usize,

    /// Stop after this many matches (0 = exhaust the range)
    #[arg(long, default_value = "0")]
    limit: usize,

    /// Sample corpus enabling leading-group pruning (candidate-file format)
    #[arg(long)]
    prior_samples: Option<PathBuf>,

    /// Digit length an identifier must have to survive pruning
    #[arg(long, default_value = "16")]
    digits: u32,

    /// Leading-group width in digits for pruning
    #[arg(long, default_value = "5")]
    group_width: u32,

    /// Write the matches to this candidate file
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PriorArgs {
    /// Sample corpus (candidate-file format)
    #[arg(short, long)]
    samples: PathBuf,

    /// Digit length the prior constrains
    #[arg(long, default_value = "16")]
    digits: u32,

    /// Leading-group width in digits
    #[arg(long, default_value = "5")]
    group_width: u32,

    /// Write the generated allow-list decision table to this file
    #[arg(long)]
    emit_table: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CorrelateArgs {
    /// Candidate file produced by a search run
    #[arg(short, long)]
    candidates: PathBuf,

    /// Known-identifier database
    #[arg(long, default_value = "known.db")]
    db: PathBuf,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Candidate file, or a directory of .txt files, to import
    #[arg(short, long)]
    input: PathBuf,

    /// Provenance label recorded for newly added identifiers
    #[arg(short, long)]
    source: String,

    /// Known-identifier database
    #[arg(long, default_value = "known.db")]
    db: PathBuf,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Known-identifier database
    #[arg(long, default_value = "known.db")]
    db: PathBuf,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

/// Parses a 32-bit checksum from hex notation
fn parse_checksum(raw: &str) -> Result<u32, String> {
    let digits = raw
        .trim()
        .strip_prefix("0x")
        .or_else(|| raw.trim().strip_prefix("0X"))
        .unwrap_or_else(|| raw.trim());
    u32::from_str_radix(digits, 16)
        .map_err(|e| format!("'{raw}' is not a 32-bit hex checksum: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    match &cli.command {
        Command::Search(args) => run_search(args),
        Command::Prior(args) => run_prior(args),
        Command::Correlate(args) => run_correlate(args),
        Command::Import(args) => run_import(args),
        Command::Export(args) => run_export(args),
    }
}

/// Loads a candidate-format file, reporting skipped lines
fn load_candidate_file(path: &Path) -> Result<CandidateSet> {
    let file = File::open(path)
        .with_context(|| format!("failed to open candidate file: {}", path.display()))?;
    let set = read_candidates(BufReader::new(file))
        .with_context(|| format!("failed to read candidate file: {}", path.display()))?;
    if set.skipped > 0 {
        warn!(
            "{}: skipped {} unparseable line(s)",
            path.display(),
            set.skipped
        );
    }
    Ok(set)
}

/// Builds a prior model from a sample corpus file
fn load_prior(path: &Path, digits: u32, group_width: u32) -> Result<PriorModel> {
    let config = PriorConfig::new(digits, group_width)
        .context("invalid prior configuration")?;
    let samples = load_candidate_file(path)?;
    if samples.ids.is_empty() {
        bail!(
            "sample corpus {} contains no identifiers; cannot build a prior",
            path.display()
        );
    }

    let model = PriorModel::from_samples(config, samples.ids.iter().copied());
    if model.is_empty() {
        bail!(
            "no sample in {} has the configured digit length {}; \
             the resulting prior would prune every candidate",
            path.display(),
            digits
        );
    }
    info!(
        "prior built: {} group(s) from {} sample(s), {} wrong-length sample(s) skipped",
        model.group_count(),
        model.sampled(),
        model.skipped()
    );
    Ok(model)
}

fn run_search(args: &SearchArgs) -> Result<()> {
    let prior = match &args.prior_samples {
        Some(path) => Some(load_prior(path, args.digits, args.group_width)?),
        None => None,
    };
    if prior.is_some() {
        warn!(
            "pruning is enabled: a true preimage outside the observed groups \
             will be missed; run without --prior-samples for full recall"
        );
    }

    let range = args.low..args.high;
    let (mut found, scan_stats) = match args.strategy {
        Strategy::Scan => {
            let config = SearchConfig::new().workers(args.workers);
            let mut engine = search(range, args.target, prior.as_ref(), &config)
                .context("failed to start search")?;

            let mut ids = Vec::new();
            for candidate in engine.by_ref() {
                println!("{}", candidate.id);
                ids.push(candidate.id);
                if args.limit > 0 && ids.len() >= args.limit {
                    debug!("match limit reached, cancelling remaining workers");
                    break;
                }
            }

            let stats = engine.stats();
            drop(engine); // joins workers; counters are final afterwards
            (ids, Some((stats.examined(), stats.pruned())))
        }
        Strategy::Meet => {
            if args.low < 10u64.pow(args.meet_width.saturating_sub(1).min(19)) {
                warn!(
                    "meet strategy does not cover identifiers shorter than {} digit(s); \
                     use --strategy scan for the low end of the range",
                    args.meet_width
                );
            }
            let table = LowTable::build(args.meet_width)
                .context("failed to build the low-part table")?;
            let found = meet_search(range, args.target, &table, prior.as_ref())
                .context("split search failed")?;
            for candidate in &found {
                println!("{}", candidate.id);
            }
            (found.into_iter().map(|c| c.id).collect::<Vec<_>>(), None)
        }
    };
    found.sort_unstable();

    match scan_stats {
        Some((examined, pruned)) => {
            info!(
                "search complete: {} match(es), {} candidate(s) examined, {} pruned",
                found.len(),
                examined,
                pruned
            );
            if pruned > 0 {
                info!(
                    "{} candidate(s) were excluded by the prior; rerun without pruning \
                     to rule out a recall miss",
                    pruned
                );
            }
        }
        None => info!("search complete: {} match(es)", found.len()),
    }
    if found.is_empty() {
        info!("no preimage of {:08x} in [{}, {})", args.target, args.low, args.high);
    }

    if let Some(out) = &args.out {
        let header = format!(
            "target {:08x}\nrange [{}, {})",
            args.target, args.low, args.high
        );
        let file = File::create(out)
            .with_context(|| format!("failed to create output file: {}", out.display()))?;
        let mut writer = BufWriter::new(file);
        let written = write_candidates(&mut writer, Some(&header), found.iter().copied())?;
        writer.flush()?;
        info!("wrote {} candidate(s) to {}", written, out.display());
    }

    Ok(())
}

fn run_prior(args: &PriorArgs) -> Result<()> {
    let model = load_prior(&args.samples, args.digits, args.group_width)?;

    println!(
        "# {} group(s) of width {} over {}-digit identifiers",
        model.group_count(),
        args.group_width,
        args.digits
    );
    println!(
        "# {} qualifying sample(s), {} skipped for wrong length",
        model.sampled(),
        model.skipped()
    );
    for (group, count) in model.groups() {
        println!("{group}  {count}");
    }

    if let Some(path) = &args.emit_table {
        let table = model.decision_table();
        std::fs::write(path, table)
            .with_context(|| format!("failed to write decision table: {}", path.display()))?;
        info!("wrote decision table to {}", path.display());
    }

    Ok(())
}

fn run_correlate(args: &CorrelateArgs) -> Result<()> {
    let candidates = load_candidate_file(&args.candidates)?;
    let store = SqliteStore::open(&args.db)
        .with_context(|| format!("failed to open store: {}", args.db.display()))?;

    let report = correlate(&candidates.ids, &store)?;

    if report.empty_input() {
        println!(
            "# input was empty: {} candidate(s), {} known identifier(s); nothing was intersected",
            report.candidate_count, report.known_count
        );
        return Ok(());
    }

    if report.entries.is_empty() {
        println!(
            "# no match among {} candidate(s) against {} known identifier(s)",
            report.candidate_count, report.known_count
        );
        println!("# the target may be absent from the collected corpus; widen collection");
        return Ok(());
    }

    for entry in &report.entries {
        if entry.sources.is_empty() {
            println!("{}", entry.id);
        } else {
            println!("{}  [{}]", entry.id, entry.sources.join(", "));
        }
    }
    info!(
        "{} match(es) out of {} candidate(s)",
        report.entries.len(),
        report.candidate_count
    );

    Ok(())
}

fn run_import(args: &ImportArgs) -> Result<()> {
    let mut files = Vec::new();
    if args.input.is_dir() {
        for entry in WalkDir::new(&args.input)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
            {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        if files.is_empty() {
            bail!("no .txt files under {}", args.input.display());
        }
    } else {
        files.push(args.input.clone());
    }

    let store = SqliteStore::open(&args.db)
        .with_context(|| format!("failed to open store: {}", args.db.display()))?;

    let mut added = 0u64;
    let mut duplicate = 0u64;
    let mut skipped = 0u64;
    for path in &files {
        let set = load_candidate_file(path)?;
        skipped += set.skipped;
        for id in set.ids {
            let record = KnownIdentifier::collected_now(id, args.source.clone());
            if store.insert_if_absent(&record)? {
                added += 1;
            } else {
                duplicate += 1;
            }
        }
        debug!("imported {}", path.display());
    }

    info!(
        "import complete: {} file(s), {} new identifier(s), {} duplicate(s), {} skipped line(s)",
        files.len(),
        added,
        duplicate,
        skipped
    );
    println!("{added} new, {duplicate} duplicate, {skipped} skipped");

    Ok(())
}

fn run_export(args: &ExportArgs) -> Result<()> {
    let store = SqliteStore::open(&args.db)
        .with_context(|| format!("failed to open store: {}", args.db.display()))?;
    let ids = store.all()?;
    let count = ids.len();

    match &args.out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create output file: {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            write_candidates(&mut writer, None, ids)?;
            writer.flush()?;
            info!("exported {} identifier(s) to {}", count, path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            write_candidates(&mut lock, None, ids)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_checksum() {
        assert_eq!(parse_checksum("338a39a5").unwrap(), 0x338A_39A5);
        assert_eq!(parse_checksum("0x338A39A5").unwrap(), 0x338A_39A5);
        assert_eq!(parse_checksum("0"), Ok(0));
        assert!(parse_checksum("").is_err());
        assert!(parse_checksum("not-hex").is_err());
        assert!(parse_checksum("1122334455").is_err());
    }

    #[test]
    fn test_import_then_export_round_trip() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("captures.txt");
        std::fs::write(&input, "# capture run\n710\n4382\nnoise\n710\n").unwrap();
        let db = dir.path().join("known.db");
        let out = dir.path().join("dump.txt");

        run_import(&ImportArgs {
            input: input.clone(),
            source: "capture-a".to_string(),
            db: db.clone(),
        })
        .unwrap();

        // Re-import: everything is a duplicate, cardinality is unchanged.
        run_import(&ImportArgs {
            input,
            source: "capture-b".to_string(),
            db: db.clone(),
        })
        .unwrap();

        run_export(&ExportArgs {
            db,
            out: Some(out.clone()),
        })
        .unwrap();

        let dump = std::fs::read_to_string(out).unwrap();
        assert_eq!(dump, "710\n4382\n");
    }

    #[test]
    fn test_import_directory_requires_txt_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.md"), "710\n").unwrap();

        let result = run_import(&ImportArgs {
            input: dir.path().to_path_buf(),
            source: "capture".to_string(),
            db: dir.path().join("known.db"),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_prior_command_emits_table() {
        let dir = TempDir::new().unwrap();
        let samples = dir.path().join("samples.txt");
        std::fs::write(&samples, "3461560000000001\n3493070000000003\n").unwrap();
        let table_path = dir.path().join("allow.rs");

        run_prior(&PriorArgs {
            samples,
            digits: 16,
            group_width: 5,
            emit_table: Some(table_path.clone()),
        })
        .unwrap();

        let table = std::fs::read_to_string(table_path).unwrap();
        assert!(table.contains("34615 => true"));
        assert!(table.contains("34930 => true"));
        assert!(table.contains("_ => false"));
    }
}
