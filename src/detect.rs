//! Suspicious timestamp detection.
//!
//! Labels every record `Trusted` or `Suspicious`, builds the nearest-anchor
//! table and groups suspicious records into maximal runs.

use crate::config::RepairConfig;
use crate::error::{Result, ScrobbleError};
use crate::models::{Anchors, Run, Scrobble, SuspicionLabel, SuspicionReason};

/// Labels plus the reason each suspicious record was flagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub labels: Vec<SuspicionLabel>,
    pub reasons: Vec<Option<SuspicionReason>>,
}

impl Detection {
    pub fn count(&self, reason: SuspicionReason) -> usize {
        self.reasons.iter().filter(|r| **r == Some(reason)).count()
    }
}

/// Reject timestamps that cannot be a play time at all.
fn check_record(index: usize, record: &Scrobble) -> Result<()> {
    if record.timestamp < 0 {
        return Err(ScrobbleError::MalformedRecord {
            index,
            reason: format!("timestamp {} is before the Unix epoch", record.timestamp),
        });
    }
    if record.played_at().is_none() {
        return Err(ScrobbleError::MalformedRecord {
            index,
            reason: format!("timestamp {} is out of range", record.timestamp),
        });
    }
    Ok(())
}

/// Label each record in one left-to-right pass.
///
/// A record is suspicious when its timestamp is intrinsically implausible, or
/// when it is earlier than the most recent trusted record. Trusted timestamps
/// are therefore non-decreasing, so every trusted record is also consistent
/// with the nearest trusted record that follows it.
pub fn detect(records: &[Scrobble], config: &RepairConfig) -> Result<Detection> {
    let mut labels = Vec::with_capacity(records.len());
    let mut reasons = Vec::with_capacity(records.len());
    let mut last_trusted: Option<i64> = None;

    for (index, record) in records.iter().enumerate() {
        check_record(index, record)?;

        let reason = if config.is_intrinsically_suspicious(record.timestamp) {
            Some(SuspicionReason::Intrinsic)
        } else if last_trusted.is_some_and(|t| record.timestamp < t) {
            Some(SuspicionReason::Sequence)
        } else {
            None
        };

        match reason {
            Some(_) => labels.push(SuspicionLabel::Suspicious),
            None => {
                last_trusted = Some(record.timestamp);
                labels.push(SuspicionLabel::Trusted);
            }
        }
        reasons.push(reason);
    }

    Ok(Detection { labels, reasons })
}

/// Same as [`detect`], labels only.
pub fn classify(records: &[Scrobble], config: &RepairConfig) -> Result<Vec<SuspicionLabel>> {
    Ok(detect(records, config)?.labels)
}

impl Anchors {
    /// Forward pass for the nearest trusted index at or before each position,
    /// backward pass for the nearest at or after.
    pub fn from_labels(labels: &[SuspicionLabel]) -> Self {
        let mut before = Vec::with_capacity(labels.len());
        let mut last = None;
        for (i, label) in labels.iter().enumerate() {
            if *label == SuspicionLabel::Trusted {
                last = Some(i);
            }
            before.push(last);
        }

        let mut after = vec![None; labels.len()];
        let mut next = None;
        for (i, label) in labels.iter().enumerate().rev() {
            if *label == SuspicionLabel::Trusted {
                next = Some(i);
            }
            after[i] = next;
        }

        Self { before, after }
    }
}

/// Group suspicious records into maximal runs, in index order.
pub fn find_runs(labels: &[SuspicionLabel], anchors: &Anchors) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut i = 0;

    while i < labels.len() {
        if !labels[i].is_suspicious() {
            i += 1;
            continue;
        }
        let start = i;
        while i + 1 < labels.len() && labels[i + 1].is_suspicious() {
            i += 1;
        }
        runs.push(Run {
            start,
            end: i,
            before: anchors.before[start],
            after: anchors.after[i],
        });
        i += 1;
    }

    runs
}
