use std::path::PathBuf;

use thiserror::Error;

/// Errors returned while reading, classifying or correcting a scrobble log.
#[derive(Debug, Error)]
pub enum ScrobbleError {
    #[error("record {index} is malformed: {reason}")]
    MalformedRecord { index: usize, reason: String },
    #[error("line {line} is malformed: {reason}")]
    MalformedLine { line: usize, reason: String },
    #[error("got {labels} labels for {records} records")]
    LabelMismatch { records: usize, labels: usize },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to read config from {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config from {path}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ScrobbleError {
    pub fn malformed_line(line: usize, reason: impl Into<String>) -> Self {
        ScrobbleError::MalformedLine {
            line,
            reason: reason.into(),
        }
    }

    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScrobbleError::Io {
            path: path.into().display().to_string(),
            source,
        }
    }

    pub fn from_json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        ScrobbleError::Json {
            path: path.into().display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScrobbleError>;
