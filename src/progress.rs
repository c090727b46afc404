//! Progress bar and logging utilities.
//!
//! Bars and spinners go to stderr so a repaired log can be piped from stdout.
//! In log-only mode they are hidden and replaced by periodic plain lines.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Format duration in human-readable format
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

/// Scrobbles handled per second, for the run summary.
pub fn scrobble_rate(scrobbles: usize, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return format!("{} scrobbles", scrobbles);
    }
    format!("{:.0} scrobbles/s", scrobbles as f64 / secs)
}

/// Progress bar over the lines of a scrobble log.
/// In log-only mode, the progress bar is hidden.
pub fn create_progress_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} log lines ({per_sec})")
                .unwrap()
                .progress_chars("=> "),
        );
    }
    pb.set_message(msg.to_string());
    pb
}

/// Tail-friendly `[phase] n/total log lines` line, in log-only mode only.
pub fn log_progress(phase: &str, current: u64, total: u64, interval: u64) {
    if is_log_only() && total > 0 && (current % interval == 0 || current == total) {
        let pct = 100.0 * current as f64 / total as f64;
        eprintln!("[{}] {}/{} log lines ({:.1}%)", phase, current, total, pct);
    }
}

/// Create a spinner for indeterminate progress.
/// In log-only mode, the spinner is hidden.
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{msg} {spinner} [{elapsed_precise}]")
                .unwrap(),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
    }
    pb.set_message(msg.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5m");
    }

    #[test]
    fn test_scrobble_rate() {
        assert_eq!(scrobble_rate(500, Duration::from_millis(250)), "2000 scrobbles/s");
        assert_eq!(scrobble_rate(3, Duration::ZERO), "3 scrobbles");
    }
}
