//! Show how a scrobble log would be classified and corrected, without writing
//!
//! Usage: scrobbler-inspect <scrobbler.log> [--config repair.json]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use scrobbler_fix::config::{parse_date_arg, RepairConfig};
use scrobbler_fix::correct::plan_run;
use scrobbler_fix::detect::{detect, find_runs};
use scrobbler_fix::logfile::{display_timestamp, parse_log};
use scrobbler_fix::models::{AnchorShape, Anchors, Scrobble, SuspicionReason};

#[derive(Parser)]
#[command(name = "scrobbler-inspect")]
#[command(about = "Report suspicious scrobble runs and their proposed corrections")]
struct Args {
    source: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    /// Earliest plausible play date (RFC 3339), or `none`
    #[arg(long)]
    earliest: Option<String>,

    /// Latest plausible play date (RFC 3339), or `none`
    #[arg(long)]
    latest: Option<String>,

    /// Maximum records listed per run
    #[arg(long, default_value = "10")]
    limit: usize,
}

fn describe(records: &[Scrobble], index: Option<usize>) -> String {
    match index {
        Some(i) => format!("#{} at {}", i, display_timestamp(records[i].timestamp)),
        None => "none".to_string(),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = RepairConfig::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(ref earliest) = args.earliest {
        config.earliest_plausible = parse_date_arg(earliest)?;
    }
    if let Some(ref latest) = args.latest {
        config.latest_plausible = parse_date_arg(latest)?;
    }
    config.validate()?;

    let text = std::fs::read_to_string(&args.source)
        .with_context(|| format!("Failed to read scrobble log {:?}", args.source))?;
    let log = parse_log(&text)?;
    let records = &log.records;

    let detection = detect(records, &config)?;
    let anchors = Anchors::from_labels(&detection.labels);
    let runs = find_runs(&detection.labels, &anchors);

    println!("\n=== CLASSIFICATION ===\n");
    println!("Scrobbles:           {:>7}", records.len());
    println!(
        "Trusted:             {:>7}",
        detection.labels.iter().filter(|l| !l.is_suspicious()).count()
    );
    println!("Near epoch/range:    {:>7}", detection.count(SuspicionReason::Intrinsic));
    println!("Out of order:        {:>7}", detection.count(SuspicionReason::Sequence));
    println!("Runs:                {:>7}", runs.len());

    println!("\n=== RUNS ===\n");
    for run in &runs {
        let shape = match run.shape() {
            AnchorShape::Both => "between anchors",
            AnchorShape::BeforeOnly => "trailing",
            AnchorShape::AfterOnly => "leading",
            AnchorShape::None => "unanchored",
        };
        println!("Records {}..={} ({} scrobbles, {})", run.start, run.end, run.len(), shape);
        println!("  before: {}", describe(records, run.before));
        println!("  after:  {}", describe(records, run.after));

        let plan = plan_run(records, run, &config);
        for diagnostic in &plan.diagnostics {
            println!("  warning: {}", diagnostic);
        }
        for (offset, t) in plan.timestamps.iter().enumerate().take(args.limit) {
            let Some(t) = t else { continue };
            let record = &records[run.start + offset];
            println!(
                "  [{}] {} - \"{}\": {} -> {}",
                run.start + offset,
                record.artist,
                record.track,
                display_timestamp(record.timestamp),
                display_timestamp(*t)
            );
        }
        if plan.timestamps.len() > args.limit {
            println!("  ... {} more", plan.timestamps.len() - args.limit);
        }
        println!();
    }

    if runs.is_empty() {
        println!("No suspicious scrobbles found.");
    }

    Ok(())
}
