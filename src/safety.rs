//! Safety utilities to prevent overwriting the device log.
//!
//! The original `scrobbler.log` is the only copy of the play history, so the
//! repaired output must never replace it.

use anyhow::{bail, Result};
use std::path::Path;

/// File name Rockbox writes on the device.
pub const DEVICE_LOG_NAME: &str = "scrobbler.log";

/// Validates that an output path is safe to write.
///
/// Checks:
/// - Output cannot be the same file as the source log
/// - Output cannot be named like the device log
pub fn validate_output_path(output: &Path, source: &Path) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if output == source {
        bail!(
            "Safety check failed: output '{}' cannot be the same as source '{}'",
            output.display(),
            source.display()
        );
    }

    // Different spellings of the same existing file
    if let (Ok(a), Ok(b)) = (output.canonicalize(), source.canonicalize()) {
        if a == b {
            bail!(
                "Safety check failed: output '{}' resolves to source '{}'",
                output.display(),
                source.display()
            );
        }
    }

    if output_name.eq_ignore_ascii_case(DEVICE_LOG_NAME) {
        bail!(
            "Safety check failed: output '{}' matches the device log name '{}'",
            output.display(),
            DEVICE_LOG_NAME
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_output() {
        let output = PathBuf::from("/tmp/scrobbler-fixed.log");
        let source = PathBuf::from("/media/ipod/.rockbox/scrobbler.log");
        assert!(validate_output_path(&output, &source).is_ok());
    }

    #[test]
    fn test_output_equals_source() {
        let path = PathBuf::from("/data/scrobbles.log");
        let result = validate_output_path(&path, &path);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot be the same as source"));
    }

    #[test]
    fn test_device_log_name_blocked() {
        let output = PathBuf::from("/tmp/SCROBBLER.LOG");
        let source = PathBuf::from("/data/backup.log");
        let result = validate_output_path(&output, &source);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("device log name"));
    }
}
