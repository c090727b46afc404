//! AUDIOSCROBBLER/1.1 log reading and writing.
//!
//! Format reference (Rockbox `lastfm_scrobbler.c`):
//!
//! ```text
//! #AUDIOSCROBBLER/1.1
//! #TZ/UNKNOWN
//! #CLIENT/Rockbox ipodvideo $Revision$
//! artist<TAB>album<TAB>track<TAB>tracknum<TAB>duration<TAB>L|S<TAB>timestamp<TAB>mbid
//! ```
//!
//! The timestamp is normally integer Unix seconds; `YYYY-MM-DD HH:MM:SS` (UTC)
//! is accepted too and written back in the same form.

use chrono::{DateTime, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, ScrobbleError};
use crate::models::{Rating, Scrobble, TimestampForm};

pub const SUPPORTED_VERSION: &str = "1.1";

/// Header written when the input had none.
pub const DEFAULT_HEADER: [&str; 3] = [
    "#AUDIOSCROBBLER/1.1",
    "#TZ/UNKNOWN",
    "#CLIENT/Rockbox ipodvideo $Revision$",
];

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// REGEX PATTERNS
// ============================================================================

static VERSION_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#AUDIOSCROBBLER/(\S+)\s*$").unwrap());

static TZ_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#TZ/(\S+)\s*$").unwrap());

static CLIENT_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#CLIENT/(.*)$").unwrap());

static DATETIME_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$").unwrap());

// ============================================================================
// Models
// ============================================================================

/// Header lines, kept verbatim, plus the values recognised in them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogHeader {
    pub lines: Vec<String>,
    pub version: Option<String>,
    pub timezone: Option<String>,
    pub client: Option<String>,
}

impl LogHeader {
    fn push(&mut self, line: &str) {
        if let Some(caps) = VERSION_LINE.captures(line) {
            self.version = Some(caps[1].to_string());
        } else if let Some(caps) = TZ_LINE.captures(line) {
            self.timezone = Some(caps[1].to_string());
        } else if let Some(caps) = CLIENT_LINE.captures(line) {
            self.client = Some(caps[1].to_string());
        }
        self.lines.push(line.to_string());
    }

    /// True when the header names a format version other than 1.1.
    pub fn is_unsupported_version(&self) -> bool {
        self.version
            .as_deref()
            .is_some_and(|v| v != SUPPORTED_VERSION)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrobbleLog {
    pub header: LogHeader,
    pub records: Vec<Scrobble>,
    /// Header or free-text `#` lines found after the first record (dropped
    /// on write)
    pub stray_comments: usize,
}

// ============================================================================
// Parsing
// ============================================================================

/// Header-style `#` lines, or `#` lines with no fields. A `#` line with tabs
/// is a record whose artist happens to start with `#`.
fn is_comment_line(line: &str) -> bool {
    if !line.starts_with('#') {
        return false;
    }
    VERSION_LINE.is_match(line)
        || TZ_LINE.is_match(line)
        || CLIENT_LINE.is_match(line)
        || !line.contains('\t')
}

/// Line-at-a-time parser so callers can report progress.
#[derive(Debug, Default)]
pub struct LogParser {
    log: ScrobbleLog,
    line_no: usize,
}

impl LogParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) -> Result<()> {
        self.line_no += 1;
        if line.trim().is_empty() {
            return Ok(());
        }
        if is_comment_line(line) {
            if self.log.records.is_empty() {
                self.log.header.push(line);
            } else {
                self.log.stray_comments += 1;
            }
            return Ok(());
        }
        let record = parse_record(self.line_no, line)?;
        self.log.records.push(record);
        Ok(())
    }

    pub fn finish(self) -> ScrobbleLog {
        self.log
    }
}

pub fn parse_log(text: &str) -> Result<ScrobbleLog> {
    let mut parser = LogParser::new();
    for line in text.lines() {
        parser.push_line(line)?;
    }
    Ok(parser.finish())
}

fn parse_timestamp(line: usize, field: &str) -> Result<(i64, TimestampForm)> {
    if let Ok(secs) = field.parse::<i64>() {
        return Ok((secs, TimestampForm::Unix));
    }
    if DATETIME_FIELD.is_match(field) {
        let parsed = NaiveDateTime::parse_from_str(field, DATETIME_FORMAT)
            .map_err(|e| ScrobbleError::malformed_line(line, format!("bad timestamp '{}': {}", field, e)))?;
        return Ok((parsed.and_utc().timestamp(), TimestampForm::DateTime));
    }
    Err(ScrobbleError::malformed_line(
        line,
        format!("bad timestamp '{}'", field),
    ))
}

/// Parse one tab-separated record line. `line` is 1-based, for errors.
pub fn parse_record(line: usize, input: &str) -> Result<Scrobble> {
    let fields: Vec<&str> = input.split('\t').collect();
    if fields.len() != 7 && fields.len() != 8 {
        return Err(ScrobbleError::malformed_line(
            line,
            format!("expected 7 or 8 tab-separated fields, found {}", fields.len()),
        ));
    }

    let track_number = match fields[3] {
        "" => None,
        pos => Some(pos.parse::<u32>().map_err(|_| {
            ScrobbleError::malformed_line(line, format!("bad track number '{}'", pos))
        })?),
    };
    let duration = fields[4]
        .parse::<u32>()
        .map_err(|_| ScrobbleError::malformed_line(line, format!("bad duration '{}'", fields[4])))?;
    let rating = Rating::from_code(fields[5])
        .ok_or_else(|| ScrobbleError::malformed_line(line, format!("bad rating '{}'", fields[5])))?;
    let (timestamp, timestamp_form) = parse_timestamp(line, fields[6])?;
    let track_id = match fields.get(7) {
        None | Some(&"") => None,
        Some(id) => Some(id.to_string()),
    };

    Ok(Scrobble {
        artist: fields[0].to_string(),
        album: fields[1].to_string(),
        track: fields[2].to_string(),
        track_number,
        duration,
        rating,
        timestamp,
        timestamp_form,
        track_id,
    })
}

// ============================================================================
// Writing
// ============================================================================

/// `YYYY-MM-DD HH:MM:SS` for a Unix timestamp, or the raw number when it is
/// out of range.
pub fn display_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|d| d.format(DATETIME_FORMAT).to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn format_timestamp(record: &Scrobble) -> String {
    match record.timestamp_form {
        TimestampForm::Unix => record.timestamp.to_string(),
        TimestampForm::DateTime => display_timestamp(record.timestamp),
    }
}

pub fn format_record(record: &Scrobble) -> String {
    [
        record.artist.clone(),
        record.album.clone(),
        record.track.clone(),
        record.track_number.map_or(String::new(), |p| p.to_string()),
        record.duration.to_string(),
        record.rating.to_string(),
        format_timestamp(record),
        record.track_id.clone().unwrap_or_default(),
    ]
    .join("\t")
}

/// Serialize the header (or the default one) and every record, one per line.
pub fn write_log(log: &ScrobbleLog) -> String {
    let mut out = String::new();
    if log.header.lines.is_empty() {
        for line in DEFAULT_HEADER {
            out.push_str(line);
            out.push('\n');
        }
    } else {
        for line in &log.header.lines {
            out.push_str(line);
            out.push('\n');
        }
    }
    for record in &log.records {
        out.push_str(&format_record(record));
        out.push('\n');
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "#AUDIOSCROBBLER/1.1\n\
#TZ/UNKNOWN\n\
#CLIENT/Rockbox ipodvideo $Revision$\n\
Radiohead\tOK Computer\tAirbag\t1\t284\tL\t1685613600\t\n\
Radiohead\tOK Computer\tParanoid Android\t2\t383\tS\t978307200\tb6c6d8b5-8ae0-4b0c-a4c4-4b9e0e2f9c8d\n";

    #[test]
    fn test_parse_header() {
        let log = parse_log(SAMPLE).unwrap();
        assert_eq!(log.header.version.as_deref(), Some("1.1"));
        assert_eq!(log.header.timezone.as_deref(), Some("UNKNOWN"));
        assert_eq!(log.header.client.as_deref(), Some("Rockbox ipodvideo $Revision$"));
        assert!(!log.header.is_unsupported_version());
    }

    #[test]
    fn test_parse_records() {
        let log = parse_log(SAMPLE).unwrap();
        assert_eq!(log.records.len(), 2);

        let first = &log.records[0];
        assert_eq!(first.artist, "Radiohead");
        assert_eq!(first.track, "Airbag");
        assert_eq!(first.track_number, Some(1));
        assert_eq!(first.duration, 284);
        assert_eq!(first.rating, Rating::Listened);
        assert_eq!(first.timestamp, 1_685_613_600);
        assert_eq!(first.track_id, None);

        let second = &log.records[1];
        assert_eq!(second.rating, Rating::Skipped);
        assert_eq!(second.track_id.as_deref(), Some("b6c6d8b5-8ae0-4b0c-a4c4-4b9e0e2f9c8d"));
    }

    #[test]
    fn test_write_round_trips_sample() {
        let log = parse_log(SAMPLE).unwrap();
        assert_eq!(write_log(&log), SAMPLE);
    }

    #[test]
    fn test_datetime_timestamps_keep_their_form() {
        let line = "Artist\tAlbum\tTrack\t\t200\tL\t2023-06-01 10:00:00";
        let record = parse_record(1, line).unwrap();
        assert_eq!(record.timestamp, 1_685_613_600);
        assert_eq!(record.timestamp_form, TimestampForm::DateTime);
        assert_eq!(record.track_number, None);

        let moved = record.with_timestamp(1_685_613_800);
        assert_eq!(
            format_record(&moved),
            "Artist\tAlbum\tTrack\t\t200\tL\t2023-06-01 10:03:20\t"
        );
    }

    #[test]
    fn test_missing_header_gets_default() {
        let log = parse_log("A\tB\tC\t\t10\tL\t1685613600\t\n").unwrap();
        assert!(log.header.lines.is_empty());
        assert!(write_log(&log).starts_with("#AUDIOSCROBBLER/1.1\n#TZ/UNKNOWN\n"));
    }

    #[test]
    fn test_malformed_lines_report_line_number() {
        let text = "#AUDIOSCROBBLER/1.1\nA\tB\tC\t\tlong\tL\t1685613600\t\n";
        let err = parse_log(text).unwrap_err();
        assert!(matches!(err, ScrobbleError::MalformedLine { line: 2, .. }));
        assert!(err.to_string().contains("bad duration 'long'"));

        assert!(parse_record(1, "A\tB\tC\t\t10\tX\t1685613600\t").is_err());
        assert!(parse_record(1, "A\tB\tC\t\t10\tL\tyesterday\t").is_err());
        assert!(parse_record(1, "A\tB\tC").is_err());
    }

    #[test]
    fn test_comments_after_records_are_counted() {
        let text = "A\tB\tC\t\t10\tL\t1685613600\t\n#AUDIOSCROBBLER/1.1\n\nD\tE\tF\t3\t20\tS\t1685613700\t\n";
        let log = parse_log(text).unwrap();
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.stray_comments, 1);
        assert!(log.header.lines.is_empty());
    }

    #[test]
    fn test_hash_artist_is_a_record() {
        let text = "#AUDIOSCROBBLER/1.1\n#TZ/UNKNOWN\n#CLIENT/Rockbox ipodvideo $Revision$\n\
#1 Dads\tAbout Face\tSo Soldiers\t1\t200\tL\t1685613600\t\n\
Radiohead\tOK Computer\tAirbag\t1\t284\tL\t1685613900\t\n\
#1 Dads\tAbout Face\tTrophies\t2\t210\tL\t1685614200\t\n";
        let log = parse_log(text).unwrap();
        assert_eq!(log.header.lines.len(), 3);
        assert_eq!(log.records.len(), 3);
        assert_eq!(log.stray_comments, 0);
        assert_eq!(log.records[0].artist, "#1 Dads");
        assert_eq!(log.records[2].track, "Trophies");
        assert_eq!(write_log(&log), text);
    }

    #[test]
    fn test_hash_line_with_wrong_field_count_is_malformed() {
        let text = "A\tB\tC\t\t10\tL\t1685613600\t\n#1 Dads\tAbout Face\n";
        let err = parse_log(text).unwrap_err();
        assert!(matches!(err, ScrobbleError::MalformedLine { line: 2, .. }));
    }

    #[test]
    fn test_unsupported_version() {
        let log = parse_log("#AUDIOSCROBBLER/1.0\n").unwrap();
        assert!(log.header.is_unsupported_version());
    }
}
