//! Core data models for scrobble repair.
//!
//! This module contains the record type parsed from the log, the labels and
//! runs produced by detection, the diagnostics produced by correction, and the
//! run statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Scrobble Records
// ============================================================================

/// Rating code from the log. `L` = listened, `S` = skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Listened,
    Skipped,
}

impl Rating {
    pub fn code(self) -> &'static str {
        match self {
            Rating::Listened => "L",
            Rating::Skipped => "S",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "L" => Some(Rating::Listened),
            "S" => Some(Rating::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// How a timestamp was written in the source line, so the writer can
/// re-emit it the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampForm {
    /// Integer seconds since the Unix epoch (what Rockbox writes)
    #[default]
    Unix,
    /// `YYYY-MM-DD HH:MM:SS` in UTC
    DateTime,
}

/// One play event from the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scrobble {
    pub artist: String,
    pub album: String,
    pub track: String,
    pub track_number: Option<u32>,
    pub duration: u32, // seconds
    pub rating: Rating,
    pub timestamp: i64, // seconds since the Unix epoch
    pub timestamp_form: TimestampForm,
    pub track_id: Option<String>, // MusicBrainz id
}

impl Scrobble {
    /// Play time as a UTC date, `None` when the timestamp is out of range.
    pub fn played_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }

    /// Same record with a different timestamp. Every other field is kept.
    pub fn with_timestamp(&self, timestamp: i64) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }
}

// ============================================================================
// Detection Models
// ============================================================================

/// Per-record timestamp plausibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SuspicionLabel {
    Trusted,
    Suspicious,
}

impl SuspicionLabel {
    pub fn is_suspicious(self) -> bool {
        self == SuspicionLabel::Suspicious
    }
}

/// Why a record ended up suspicious (statistics only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspicionReason {
    /// Near the reset epoch or before the earliest plausible date
    Intrinsic,
    /// Plausible on its own but goes backwards against trusted neighbours
    Sequence,
}

/// Nearest trusted record on each side of every index.
///
/// Computed once from the labels and shared by run grouping and correction.
/// For a trusted index both entries point at the index itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Anchors {
    pub before: Vec<Option<usize>>,
    pub after: Vec<Option<usize>>,
}

/// Which anchors a run has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorShape {
    Both,
    BeforeOnly,
    AfterOnly,
    None,
}

/// Maximal contiguous block of suspicious records (`end` inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub start: usize,
    pub end: usize,
    pub before: Option<usize>, // index of the preceding trusted record
    pub after: Option<usize>,  // index of the following trusted record
}

impl Run {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn shape(&self) -> AnchorShape {
        match (self.before, self.after) {
            (Some(_), Some(_)) => AnchorShape::Both,
            (Some(_), None) => AnchorShape::BeforeOnly,
            (None, Some(_)) => AnchorShape::AfterOnly,
            (None, None) => AnchorShape::None,
        }
    }
}

// ============================================================================
// Correction Diagnostics
// ============================================================================

/// Per-run condition reported alongside the corrected records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// No trusted record on either side; timestamps left untouched
    Unanchored { start: usize, end: usize },
    /// The gap between anchors cannot give every record the minimum spacing;
    /// records were spread evenly and may share timestamps
    WindowTooNarrow {
        start: usize,
        end: usize,
        window_secs: i64,
        required_secs: i64,
    },
    /// Fixed-offset mode left this record alone: it was only out of order, or
    /// the shifted timestamp would still be implausible
    NotShifted { index: usize },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::Unanchored { start, end } => write!(
                f,
                "records {}..={}: no trusted anchor on either side, timestamps left unchanged",
                start, end
            ),
            Diagnostic::WindowTooNarrow {
                start,
                end,
                window_secs,
                required_secs,
            } => write!(
                f,
                "records {}..={}: window of {}s is narrower than the {}s needed, spacing clamped",
                start, end, window_secs, required_secs
            ),
            Diagnostic::NotShifted { index } => write!(
                f,
                "record {}: not shifted by the fixed offset, timestamp left unchanged",
                index
            ),
        }
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Counters for one repair run.
#[derive(Default, Debug, Clone, Serialize)]
pub struct RepairStats {
    // Detection
    pub total_records: usize,
    pub trusted: usize,
    pub intrinsic_suspicious: usize,
    pub sequence_suspicious: usize,

    // Runs by anchor shape
    pub runs: usize,
    pub runs_both_anchors: usize,
    pub runs_leading: usize,  // only a following anchor
    pub runs_trailing: usize, // only a preceding anchor
    pub runs_unanchored: usize,

    // Correction
    pub corrected: usize,
    pub left_unchanged: usize,
    pub narrow_windows: usize,
    pub fixed_offset_applied: bool,

    // Timing
    pub elapsed_seconds: f64,
}

impl RepairStats {
    /// Share of records whose timestamp was rewritten, as a percentage
    pub fn correction_rate(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            100.0 * self.corrected as f64 / self.total_records as f64
        }
    }

    pub fn record_run(&mut self, run: &Run) {
        self.runs += 1;
        match run.shape() {
            AnchorShape::Both => self.runs_both_anchors += 1,
            AnchorShape::BeforeOnly => self.runs_trailing += 1,
            AnchorShape::AfterOnly => self.runs_leading += 1,
            AnchorShape::None => self.runs_unanchored += 1,
        }
    }

    /// Log stats to stderr in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            eprintln!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_codes() {
        assert_eq!(Rating::from_code("L"), Some(Rating::Listened));
        assert_eq!(Rating::from_code("S"), Some(Rating::Skipped));
        assert_eq!(Rating::from_code("X"), None);
        assert_eq!(Rating::Skipped.to_string(), "S");
    }

    #[test]
    fn test_run_shape() {
        let run = Run { start: 1, end: 2, before: Some(0), after: None };
        assert_eq!(run.shape(), AnchorShape::BeforeOnly);
        assert_eq!(run.len(), 2);

        let mut stats = RepairStats::default();
        stats.record_run(&run);
        stats.record_run(&Run { start: 0, end: 0, before: None, after: None });
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.runs_trailing, 1);
        assert_eq!(stats.runs_unanchored, 1);
    }

    #[test]
    fn test_correction_rate() {
        let stats = RepairStats {
            total_records: 8,
            corrected: 2,
            ..Default::default()
        };
        assert!((stats.correction_rate() - 25.0).abs() < f64::EPSILON);
        assert_eq!(RepairStats::default().correction_rate(), 0.0);
    }

    #[test]
    fn test_diagnostic_serializes_with_kind() {
        let json = serde_json::to_string(&Diagnostic::Unanchored { start: 0, end: 3 }).unwrap();
        assert_eq!(json, r#"{"kind":"unanchored","start":0,"end":3}"#);
        let json = serde_json::to_string(&Diagnostic::NotShifted { index: 4 }).unwrap();
        assert_eq!(json, r#"{"kind":"not_shifted","index":4}"#);
    }
}
