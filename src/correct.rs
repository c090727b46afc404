//! Timestamp correction for suspicious runs.
//!
//! Each run is planned independently from the input and its own anchors, so
//! plans are built in parallel and then applied in index order.

use rayon::prelude::*;

use crate::config::{RepairConfig, SECONDS_PER_DAY};
use crate::detect::find_runs;
use crate::error::{Result, ScrobbleError};
use crate::models::{Anchors, Diagnostic, Run, Scrobble, SuspicionLabel};

/// Corrected records plus per-run diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub records: Vec<Scrobble>,
    pub diagnostics: Vec<Diagnostic>,
    /// Number of records that were assigned a new timestamp
    pub corrected: usize,
}

/// New timestamp for each record of a run; `None` leaves that record untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub run: Run,
    pub timestamps: Vec<Option<i64>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunPlan {
    fn rewrite(run: &Run, timestamps: Vec<i64>) -> Self {
        Self {
            run: *run,
            timestamps: timestamps.into_iter().map(Some).collect(),
            diagnostics: Vec::new(),
        }
    }

    fn keep(run: &Run, diagnostic: Diagnostic) -> Self {
        Self {
            run: *run,
            timestamps: vec![None; run.len()],
            diagnostics: vec![diagnostic],
        }
    }
}

/// Seconds from a record's start to the next record's start.
fn gap(record: &Scrobble, config: &RepairConfig) -> i64 {
    if record.duration == 0 {
        config.default_gap_secs
    } else {
        i64::from(record.duration)
    }
}

/// `lo + window * num / den` without overflowing on large windows.
fn lerp(lo: i64, window: i64, num: i64, den: i64) -> i64 {
    lo + (i128::from(window) * i128::from(num) / i128::from(den)) as i64
}

/// Spread a run between two anchors.
///
/// Uses the durations of the preceding anchor and of every run record as
/// relative gaps, scaled to fill the window. Falls back to equal spacing when
/// a duration is missing, the durations overflow the window, or scaling would
/// leave two records closer than `min_spacing_secs`.
fn plan_between(records: &[Scrobble], run: &Run, before: usize, after: usize, config: &RepairConfig) -> RunPlan {
    let lo = records[before].timestamp;
    let window = (records[after].timestamp - lo).max(0);
    let n = run.len() as i64;
    let slots = n + 1;
    let required = slots.saturating_mul(config.min_spacing_secs);

    let gaps: Vec<i64> = std::iter::once(&records[before])
        .chain(&records[run.start..=run.end])
        .map(|r| i64::from(r.duration))
        .collect();
    let total: i64 = gaps.iter().sum();

    if window >= required && total > 0 && total <= window && gaps.iter().all(|&g| g > 0) {
        let mut cum = 0;
        let positions: Vec<i64> = gaps[..run.len()]
            .iter()
            .map(|g| {
                cum += g;
                lerp(lo, window, cum, total)
            })
            .collect();

        if spacing_ok(lo, lo + window, &positions, config.min_spacing_secs) {
            return RunPlan::rewrite(run, positions);
        }
    }

    let positions = (1..=n).map(|i| lerp(lo, window, i, slots)).collect();
    let mut plan = RunPlan::rewrite(run, positions);
    if window < required {
        plan.diagnostics.push(Diagnostic::WindowTooNarrow {
            start: run.start,
            end: run.end,
            window_secs: window,
            required_secs: required,
        });
    }
    plan
}

fn spacing_ok(lo: i64, hi: i64, positions: &[i64], min_spacing: i64) -> bool {
    let mut prev = lo;
    for &t in positions {
        if t - prev < min_spacing {
            return false;
        }
        prev = t;
    }
    hi - prev >= min_spacing
}

/// Accumulate forward from the preceding anchor.
///
/// A duration is the gap from a record's start to the next record's start,
/// so the first run record starts at `P.t + gap(P)` where `P` is the anchor,
/// and each later one at the previous start plus that record's own gap.
fn plan_forward(records: &[Scrobble], run: &Run, before: usize, config: &RepairConfig) -> Vec<i64> {
    let mut t = records[before].timestamp.saturating_add(gap(&records[before], config));
    let mut out = Vec::with_capacity(run.len());
    for record in &records[run.start..=run.end] {
        out.push(t);
        t = t.saturating_add(gap(record, config));
    }
    out
}

/// Accumulate backward from the following anchor.
fn plan_backward(records: &[Scrobble], run: &Run, after: usize, config: &RepairConfig) -> Vec<i64> {
    let mut t = records[after].timestamp;
    let mut out = vec![0; run.len()];
    for (slot, record) in out.iter_mut().zip(&records[run.start..=run.end]).rev() {
        t = t.saturating_sub(gap(record, config));
        *slot = t;
    }
    out
}

/// Shift only records that look like a reset clock, and only when the shift
/// lands on a plausible date. Out-of-order records already carry a plausible
/// time and are kept as they are.
fn plan_fixed_offset(records: &[Scrobble], run: &Run, days: u64, config: &RepairConfig) -> RunPlan {
    let offset = i64::try_from(days)
        .unwrap_or(i64::MAX)
        .saturating_mul(SECONDS_PER_DAY);
    let mut plan = RunPlan {
        run: *run,
        timestamps: Vec::with_capacity(run.len()),
        diagnostics: Vec::new(),
    };

    for (index, record) in records.iter().enumerate().take(run.end + 1).skip(run.start) {
        let shifted = record.timestamp.saturating_add(offset);
        if config.is_intrinsically_suspicious(record.timestamp)
            && !config.is_intrinsically_suspicious(shifted)
        {
            plan.timestamps.push(Some(shifted));
        } else {
            plan.timestamps.push(None);
            plan.diagnostics.push(Diagnostic::NotShifted { index });
        }
    }
    plan
}

/// Work out the new timestamps for one run.
pub fn plan_run(records: &[Scrobble], run: &Run, config: &RepairConfig) -> RunPlan {
    if let Some(days) = config.fixed_offset_days {
        return plan_fixed_offset(records, run, days, config);
    }

    match (run.before, run.after) {
        (Some(before), Some(after)) => plan_between(records, run, before, after, config),
        (Some(before), None) => RunPlan::rewrite(run, plan_forward(records, run, before, config)),
        (None, Some(after)) => RunPlan::rewrite(run, plan_backward(records, run, after, config)),
        (None, None) => RunPlan::keep(
            run,
            Diagnostic::Unanchored {
                start: run.start,
                end: run.end,
            },
        ),
    }
}

/// Apply corrections for already-grouped runs.
pub fn apply_runs(records: &[Scrobble], runs: &[Run], config: &RepairConfig) -> Correction {
    let plans: Vec<RunPlan> = runs
        .par_iter()
        .map(|run| plan_run(records, run, config))
        .collect();

    let mut out = records.to_vec();
    let mut diagnostics = Vec::new();
    let mut corrected = 0;

    for plan in plans {
        for (offset, timestamp) in plan.timestamps.into_iter().enumerate() {
            if let Some(timestamp) = timestamp {
                out[plan.run.start + offset].timestamp = timestamp;
                corrected += 1;
            }
        }
        diagnostics.extend(plan.diagnostics);
    }

    Correction {
        records: out,
        diagnostics,
        corrected,
    }
}

/// Rewrite the timestamps of every suspicious record.
pub fn correct(records: &[Scrobble], labels: &[SuspicionLabel], config: &RepairConfig) -> Result<Correction> {
    if records.len() != labels.len() {
        return Err(ScrobbleError::LabelMismatch {
            records: records.len(),
            labels: labels.len(),
        });
    }
    let anchors = Anchors::from_labels(labels);
    let runs = find_runs(labels, &anchors);
    Ok(apply_runs(records, &runs, config))
}
