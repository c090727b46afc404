//! Detect-then-correct pipeline with statistics.

use std::time::Instant;

use crate::config::RepairConfig;
use crate::correct::apply_runs;
use crate::detect::{detect, find_runs};
use crate::error::Result;
use crate::models::{Anchors, Diagnostic, RepairStats, Run, Scrobble, SuspicionLabel, SuspicionReason};

/// Everything a repair produced.
#[derive(Debug, Clone)]
pub struct Repair {
    pub records: Vec<Scrobble>,
    pub labels: Vec<SuspicionLabel>,
    pub runs: Vec<Run>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: RepairStats,
}

/// One rewritten timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub index: usize,
    pub before: i64,
    pub after: i64,
}

impl Repair {
    /// Timestamps that differ between `original` and the repaired records.
    pub fn changes(&self, original: &[Scrobble]) -> Vec<Change> {
        original
            .iter()
            .zip(&self.records)
            .enumerate()
            .filter(|(_, (a, b))| a.timestamp != b.timestamp)
            .map(|(index, (a, b))| Change {
                index,
                before: a.timestamp,
                after: b.timestamp,
            })
            .collect()
    }
}

pub fn repair(records: &[Scrobble], config: &RepairConfig) -> Result<Repair> {
    let start = Instant::now();
    config.validate()?;

    let detection = detect(records, config)?;
    let anchors = Anchors::from_labels(&detection.labels);
    let runs = find_runs(&detection.labels, &anchors);
    let correction = apply_runs(records, &runs, config);

    let mut stats = RepairStats {
        total_records: records.len(),
        trusted: detection.labels.iter().filter(|l| !l.is_suspicious()).count(),
        intrinsic_suspicious: detection.count(SuspicionReason::Intrinsic),
        sequence_suspicious: detection.count(SuspicionReason::Sequence),
        corrected: correction.corrected,
        fixed_offset_applied: config.fixed_offset_days.is_some(),
        ..Default::default()
    };
    for run in &runs {
        stats.record_run(run);
    }
    for diagnostic in &correction.diagnostics {
        match diagnostic {
            Diagnostic::Unanchored { start, end } => stats.left_unchanged += end - start + 1,
            Diagnostic::WindowTooNarrow { .. } => stats.narrow_windows += 1,
            Diagnostic::NotShifted { .. } => stats.left_unchanged += 1,
        }
    }
    stats.elapsed_seconds = start.elapsed().as_secs_f64();

    Ok(Repair {
        records: correction.records,
        labels: detection.labels,
        runs,
        diagnostics: correction.diagnostics,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::classify;
    use crate::models::{Rating, TimestampForm};

    const T_2023: i64 = 1_685_613_600;
    const T_2001: i64 = 978_307_200;

    fn scrobble(timestamp: i64, duration: u32) -> Scrobble {
        Scrobble {
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            track: "Track".to_string(),
            track_number: None,
            duration,
            rating: Rating::Skipped,
            timestamp,
            timestamp_form: TimestampForm::Unix,
            track_id: Some("mbid".to_string()),
        }
    }

    fn mixed_log() -> Vec<Scrobble> {
        vec![
            scrobble(T_2001 + 10, 240),
            scrobble(T_2023, 300),
            scrobble(T_2001, 180),
            scrobble(T_2001 + 60, 180),
            scrobble(T_2023 + 600, 300),
            scrobble(T_2023 + 100, 200),
            scrobble(T_2023 + 900, 200),
            scrobble(T_2001 + 300, 200),
        ]
    }

    #[test]
    fn test_repair_stats() {
        let result = repair(&mixed_log(), &RepairConfig::default()).unwrap();
        let stats = &result.stats;

        assert_eq!(stats.total_records, 8);
        assert_eq!(stats.trusted, 3);
        assert_eq!(stats.intrinsic_suspicious, 4);
        assert_eq!(stats.sequence_suspicious, 1);
        assert_eq!(stats.runs, 4);
        assert_eq!(stats.runs_leading, 1);
        assert_eq!(stats.runs_both_anchors, 2);
        assert_eq!(stats.runs_trailing, 1);
        assert_eq!(stats.corrected, 5);
        assert_eq!(stats.left_unchanged, 0);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let config = RepairConfig::default();
        let first = repair(&mixed_log(), &config).unwrap();
        let labels = classify(&first.records, &config).unwrap();
        assert!(labels.iter().all(|l| *l == SuspicionLabel::Trusted));

        let second = repair(&first.records, &config).unwrap();
        assert_eq!(second.records, first.records);
        assert!(second.changes(&first.records).is_empty());
    }

    #[test]
    fn test_changes_lists_rewritten_indices() {
        let original = mixed_log();
        let result = repair(&original, &RepairConfig::default()).unwrap();
        let indices: Vec<usize> = result.changes(&original).iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 2, 3, 5, 7]);
    }

    #[test]
    fn test_unanchored_counts() {
        let log = vec![scrobble(T_2001, 100), scrobble(T_2001 + 100, 100)];
        let result = repair(&log, &RepairConfig::default()).unwrap();
        assert_eq!(result.stats.runs_unanchored, 1);
        assert_eq!(result.stats.left_unchanged, 2);
        assert_eq!(result.stats.corrected, 0);
        assert_eq!(result.diagnostics.len(), 1);
    }
}
