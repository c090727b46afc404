//! Scrobble log repair library - shared modules for all binaries.

pub mod config;
pub mod correct;
pub mod detect;
pub mod error;
pub mod logfile;
pub mod models;
pub mod progress;
pub mod repair;
pub mod safety;

pub use config::RepairConfig;
pub use correct::{correct, Correction};
pub use detect::{classify, find_runs};
pub use error::ScrobbleError;
pub use models::{Anchors, Diagnostic, Run, Scrobble, SuspicionLabel};
pub use repair::{repair, Repair};
