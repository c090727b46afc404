//! Tunable thresholds for detection and correction.
//!
//! Everything here is supplied by the caller; the detector and corrector
//! never hard-code an epoch, so tests can use arbitrary dates.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, ScrobbleError};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Shift that moved a Jan 2001 reset clock to mid-2023 (22 years + 215 days).
pub const LEGACY_OFFSET_DAYS: u64 = (365 * 22) + 215;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Date the device clock falls back to after a reset
    pub reset_epoch: DateTime<Utc>,

    /// Timestamps within this many days of `reset_epoch` are suspicious
    pub epoch_tolerance_days: i64,

    /// Anything before this is suspicious (device manufacture date, first
    /// listen, ...). `None` disables the check.
    pub earliest_plausible: Option<DateTime<Utc>>,

    /// Anything after this is suspicious (usually when the log was copied off
    /// the device). `None` disables the check.
    pub latest_plausible: Option<DateTime<Utc>>,

    /// Minimum seconds between consecutive records when spreading a run
    /// between two anchors
    pub min_spacing_secs: i64,

    /// Gap used instead of a zero duration when accumulating from one anchor
    pub default_gap_secs: i64,

    /// Shift reset-clock records forward by this many days instead of
    /// inferring from anchors. Out-of-order records are left alone.
    pub fixed_offset_days: Option<u64>,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            reset_epoch: Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap(),
            epoch_tolerance_days: 7,
            earliest_plausible: Some(Utc.with_ymd_and_hms(2005, 1, 1, 0, 0, 0).unwrap()),
            latest_plausible: None,
            min_spacing_secs: 1,
            default_gap_secs: 1,
            fixed_offset_days: None,
        }
    }
}

/// Parse a date argument: RFC 3339, or `none` to disable the bound.
pub fn parse_date_arg(value: &str) -> Result<Option<DateTime<Utc>>> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|d| Some(d.with_timezone(&Utc)))
        .map_err(|e| ScrobbleError::Config(format!("bad date '{}': {}", value, e)))
}

impl RepairConfig {
    /// Defaults, or the JSON file at `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_json_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Load a config from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ScrobbleError::from_io(path, e))?;
        let config: RepairConfig =
            serde_json::from_str(&raw).map_err(|e| ScrobbleError::from_json(path, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.epoch_tolerance_days < 0 {
            return Err(ScrobbleError::Config(format!(
                "epoch_tolerance_days must not be negative (got {})",
                self.epoch_tolerance_days
            )));
        }
        if self.min_spacing_secs < 0 {
            return Err(ScrobbleError::Config(format!(
                "min_spacing_secs must not be negative (got {})",
                self.min_spacing_secs
            )));
        }
        if self.default_gap_secs < 0 {
            return Err(ScrobbleError::Config(format!(
                "default_gap_secs must not be negative (got {})",
                self.default_gap_secs
            )));
        }
        if let (Some(earliest), Some(latest)) = (self.earliest_plausible, self.latest_plausible) {
            if latest < earliest {
                return Err(ScrobbleError::Config(format!(
                    "latest_plausible ({}) is before earliest_plausible ({})",
                    latest.to_rfc3339(),
                    earliest.to_rfc3339()
                )));
            }
        }
        Ok(())
    }

    pub fn epoch_secs(&self) -> i64 {
        self.reset_epoch.timestamp()
    }

    pub fn tolerance_secs(&self) -> i64 {
        self.epoch_tolerance_days.saturating_mul(SECONDS_PER_DAY)
    }

    /// True when `timestamp` on its own looks like a reset clock.
    pub fn is_intrinsically_suspicious(&self, timestamp: i64) -> bool {
        let near_epoch =
            timestamp.saturating_sub(self.epoch_secs()).saturating_abs() <= self.tolerance_secs();
        let too_early = self
            .earliest_plausible
            .is_some_and(|earliest| timestamp < earliest.timestamp());
        let too_late = self
            .latest_plausible
            .is_some_and(|latest| timestamp > latest.timestamp());
        near_epoch || too_early || too_late
    }
}
