use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use scrobbler_fix::config::{parse_date_arg, RepairConfig, LEGACY_OFFSET_DAYS};
use scrobbler_fix::logfile::{display_timestamp, write_log, LogParser, ScrobbleLog};
use scrobbler_fix::progress::{
    create_progress_bar, create_spinner, format_duration, log_progress, scrobble_rate, set_log_only,
};
use scrobbler_fix::repair::repair;
use scrobbler_fix::safety::validate_output_path;

#[derive(Parser)]
#[command(name = "scrobbler-fix")]
#[command(about = "Repair reset-clock timestamps in a Rockbox AUDIOSCROBBLER/1.1 log")]
struct Args {
    source: PathBuf,

    /// Output file; stdout when omitted or `-`
    output: Option<PathBuf>,

    /// JSON file with detection/correction settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Date the device clock resets to (RFC 3339)
    #[arg(long)]
    reset_epoch: Option<String>,

    #[arg(long)]
    tolerance_days: Option<i64>,

    /// Earliest plausible play date (RFC 3339), or `none`
    #[arg(long)]
    earliest: Option<String>,

    /// Latest plausible play date (RFC 3339), or `none`
    #[arg(long)]
    latest: Option<String>,

    #[arg(long)]
    min_spacing: Option<i64>,

    #[arg(long)]
    default_gap: Option<i64>,

    /// Shift reset-clock scrobbles by a fixed number of days instead of using anchors
    #[arg(long, conflicts_with = "legacy_offset")]
    offset_days: Option<u64>,

    /// Fixed shift of 22 years + 215 days
    #[arg(long)]
    legacy_offset: bool,

    /// Write run statistics as JSON
    #[arg(long)]
    stats: Option<PathBuf>,

    #[arg(long, default_value = "0")]
    workers: usize,

    /// Hide progress bars and print plain progress lines
    #[arg(long)]
    log_only: bool,

    /// Report changes without writing the repaired log
    #[arg(long)]
    dry_run: bool,
}

const PROGRESS_INTERVAL: u64 = 1_000;

fn build_config(args: &Args) -> Result<RepairConfig> {
    let mut config = RepairConfig::load(args.config.as_deref()).context("Failed to load config")?;

    if let Some(ref epoch) = args.reset_epoch {
        config.reset_epoch = parse_date_arg(epoch)?.context("--reset-epoch cannot be 'none'")?;
    }
    if let Some(days) = args.tolerance_days {
        config.epoch_tolerance_days = days;
    }
    if let Some(ref earliest) = args.earliest {
        config.earliest_plausible = parse_date_arg(earliest)?;
    }
    if let Some(ref latest) = args.latest {
        config.latest_plausible = parse_date_arg(latest)?;
    }
    if let Some(spacing) = args.min_spacing {
        config.min_spacing_secs = spacing;
    }
    if let Some(gap) = args.default_gap {
        config.default_gap_secs = gap;
    }
    if args.legacy_offset {
        config.fixed_offset_days = Some(LEGACY_OFFSET_DAYS);
    } else if args.offset_days.is_some() {
        config.fixed_offset_days = args.offset_days;
    }

    config.validate()?;
    Ok(config)
}

fn read_log(path: &Path) -> Result<ScrobbleLog> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scrobble log {:?}", path))?;
    let total = text.lines().count() as u64;

    let pb = create_progress_bar(total, "Reading scrobbler.log");
    let mut parser = LogParser::new();
    for (i, line) in text.lines().enumerate() {
        parser.push_line(line)?;
        pb.inc(1);
        log_progress("read-scrobbles", i as u64 + 1, total, PROGRESS_INTERVAL);
    }
    let log = parser.finish();
    pb.finish_with_message(format!("Parsed {} scrobbles", log.records.len()));

    Ok(log)
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_log_only(args.log_only);

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let start = Instant::now();
    let config = build_config(&args)?;

    let output = args.output.as_ref().filter(|p| p.as_os_str() != "-");
    if let Some(output) = output {
        validate_output_path(output, &args.source)?;
    }

    eprintln!("Reading scrobble log: {:?}", args.source);
    let log = read_log(&args.source)?;

    if log.header.is_unsupported_version() {
        eprintln!(
            "Warning: log declares AUDIOSCROBBLER/{}, expected 1.1",
            log.header.version.as_deref().unwrap_or("?")
        );
    }
    if log.stray_comments > 0 {
        eprintln!("Warning: dropping {} comment lines found after the first record", log.stray_comments);
    }

    let spinner = create_spinner("Repairing timestamps");
    let result = repair(&log.records, &config)?;
    spinner.finish_with_message(format!("Repaired {} timestamps", result.stats.corrected));

    for diagnostic in &result.diagnostics {
        eprintln!("Warning: {}", diagnostic);
    }

    let changes = result.changes(&log.records);
    if args.dry_run {
        for change in &changes {
            let record = &log.records[change.index];
            eprintln!(
                "[{}] {} - {}: {} -> {}",
                change.index,
                record.artist,
                record.track,
                display_timestamp(change.before),
                display_timestamp(change.after)
            );
        }
    } else {
        let repaired = ScrobbleLog {
            records: result.records.clone(),
            ..log
        };
        let text = write_log(&repaired);
        match output {
            Some(path) => std::fs::write(path, text)
                .with_context(|| format!("Failed to write repaired log {:?}", path))?,
            None => std::io::stdout()
                .lock()
                .write_all(text.as_bytes())
                .context("Failed to write repaired log to stdout")?,
        }
    }

    let mut stats = result.stats;
    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    if args.log_only {
        stats.log_phase("repair");
    }
    if let Some(ref path) = args.stats {
        stats.write_to_file(path).context("Failed to write stats")?;
    }

    eprintln!("\n{:=<60}", "");
    eprintln!("Repair complete{}", if args.dry_run { " (dry run)" } else { "" });
    eprintln!("  Scrobbles:  {}", stats.total_records);
    eprintln!(
        "  Suspicious: {} ({} near epoch/out of range, {} out of order)",
        stats.intrinsic_suspicious + stats.sequence_suspicious,
        stats.intrinsic_suspicious,
        stats.sequence_suspicious
    );
    eprintln!("  Runs:       {}", stats.runs);
    eprintln!(
        "  Corrected:  {} ({:.1}%), {} changed",
        stats.corrected,
        stats.correction_rate(),
        changes.len()
    );
    eprintln!("  Unchanged:  {}", stats.left_unchanged);
    eprintln!(
        "  Elapsed:    {} ({})",
        format_duration(start.elapsed()),
        scrobble_rate(stats.total_records, start.elapsed())
    );
    eprintln!("{:=<60}", "");

    Ok(())
}
