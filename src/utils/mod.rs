//! Utilities module for logging, metrics, and helper functions
//!
//! This module provides:
//! - Structured logging with tracing
//! - Evaluation metrics (micro/macro accuracy, log loss, confusion matrix)
//! - Error handling types
//! - Formatting helpers for console reports

pub mod error;
pub mod logging;
pub mod metrics;

use std::path::{Path, PathBuf};

pub use error::{RecognitionError, Result};
pub use logging::{init_logging, LogConfig};
pub use metrics::{ConfusionMatrix, ModelMetrics};

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}

/// Format a byte count as megabytes
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}

/// Resolve `path` against the current directory when it is relative
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.5), "30.5s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m");
    }

    #[test]
    fn test_format_megabytes() {
        assert_eq!(format_megabytes(1024 * 1024), "1.0 MB");
        assert_eq!(format_megabytes(0), "0.0 MB");
    }

    #[test]
    fn test_absolute_path() {
        let abs = absolute_path(Path::new("models/model.json")).unwrap();
        assert!(abs.is_absolute());
        assert!(abs.ends_with("models/model.json"));

        let already = std::env::temp_dir();
        assert_eq!(absolute_path(&already).unwrap(), already);
    }
}
