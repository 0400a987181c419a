//! Dataset validation
//!
//! Structural and class-balance checks run before training. Problems are
//! reported as data in a `DatasetReport`; `validate` itself never fails.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::dataset::loader::{class_label, extension_histogram, find_class_images, list_class_dirs};
use crate::dataset::MIN_IMAGES_PER_CLASS;

/// Outcome of validating a dataset root
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Image count per class, in directory enumeration order
    pub class_counts: Vec<(String, usize)>,
    pub total_images: usize,
}

impl DatasetReport {
    fn invalid(message: String) -> Self {
        Self {
            is_valid: false,
            errors: vec![message],
            ..Self::default()
        }
    }

    /// Number of classes with at least one image
    pub fn non_empty_classes(&self) -> usize {
        self.class_counts.iter().filter(|(_, count)| *count > 0).count()
    }

    /// Image count for a class, if the class was seen
    pub fn count_for(&self, label: &str) -> Option<usize> {
        self.class_counts
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, count)| *count)
    }

    /// Class counts, largest class first. Ties keep enumeration order.
    pub fn counts_by_size(&self) -> Vec<(&str, usize)> {
        let mut counts: Vec<(&str, usize)> = self
            .class_counts
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
    }

    /// Emit every error and warning through tracing
    pub fn log(&self) {
        for message in &self.errors {
            error!("{}", message);
        }
        for message in &self.warnings {
            warn!("{}", message);
        }
        if self.is_valid {
            info!(
                "Dataset valid: {} images across {} classes",
                self.total_images,
                self.class_counts.len()
            );
        }
    }
}

impl fmt::Display for DatasetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dataset Validation")?;
        writeln!(f, "  Valid:        {}", self.is_valid)?;
        writeln!(f, "  Total images: {}", self.total_images)?;
        writeln!(f, "  Classes:      {}", self.class_counts.len())?;
        for (label, count) in &self.class_counts {
            writeln!(f, "    {:<24} {:>6}", label, count)?;
        }
        for message in &self.errors {
            writeln!(f, "  ERROR:   {}", message)?;
        }
        for message in &self.warnings {
            writeln!(f, "  WARNING: {}", message)?;
        }
        Ok(())
    }
}

/// Validate the dataset rooted at `root`
pub fn validate<P: AsRef<Path>>(root: P) -> DatasetReport {
    let root = root.as_ref();

    if !root.is_dir() {
        return DatasetReport::invalid(format!("Dataset directory not found: {}", root.display()));
    }

    let class_dirs = match list_class_dirs(root) {
        Ok(dirs) => dirs,
        Err(e) => {
            return DatasetReport::invalid(format!(
                "Could not read dataset directory {}: {}",
                root.display(),
                e
            ))
        }
    };

    if class_dirs.is_empty() {
        return DatasetReport::invalid(
            "No subdirectories found. Each fruit category should be in its own subdirectory."
                .to_string(),
        );
    }

    let mut report = DatasetReport::default();

    if class_dirs.len() == 1 {
        report.warnings.push(
            "Only one class found. Multi-class classification requires at least 2 classes."
                .to_string(),
        );
    }

    for class_dir in &class_dirs {
        let label = class_label(class_dir);
        let files = find_class_images(class_dir);
        let count = files.len();

        if count == 0 {
            report
                .warnings
                .push(format!("No images found for class '{}' (searched recursively)", label));
        } else {
            let formats = extension_histogram(&files)
                .into_iter()
                .map(|(ext, n)| format!("{ext}: {n}"))
                .collect::<Vec<_>>()
                .join(", ");
            info!("{}: {} images ({})", label, count, formats);

            if count < MIN_IMAGES_PER_CLASS {
                report.warnings.push(format!(
                    "Very few images ({}) found for class '{}'. Consider adding more for better training.",
                    count, label
                ));
            }
        }

        report.total_images += count;
        report.class_counts.push((label, count));
    }

    if report.total_images == 0 {
        report
            .errors
            .push("No valid images found in the dataset.".to_string());
    }

    report.is_valid = report.errors.is_empty();
    report
}
