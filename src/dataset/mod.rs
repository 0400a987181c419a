//! Dataset module for class-per-directory image collections
//!
//! This module provides functionality for:
//! - Discovering labeled images on disk (`loader`)
//! - Validating the dataset layout and class balance (`validation`)
//! - Splitting into train/validation/test partitions (`split`)
//! - Inferring the common image root of a flat file list (`paths`)
//!
//! ## Expected layout
//!
//! ```text
//! root/
//! ├── apple/
//! │   ├── a1.jpg
//! │   └── batch_2/a2.png
//! ├── banana/
//! │   └── ...
//! └── ...
//! ```
//!
//! Every top-level subdirectory is a class; images may be nested below it.

pub mod loader;
pub mod paths;
pub mod split;
pub mod validation;

use std::path::Path;

pub use loader::{discover, find_class_images, list_class_dirs, LabeledImage};
pub use paths::{resolve_common_root, root_from_labels, verify_common_root};
pub use split::{DatasetSplits, SplitFractions, SplitStats};
pub use validation::{validate, DatasetReport};

/// Image extensions accepted everywhere in the pipeline (lowercase, no dot)
pub const SUPPORTED_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "bmp", "gif", "tiff", "tif", "webp"];

/// Classes with fewer images than this get a warning during validation
pub const MIN_IMAGES_PER_CLASS: usize = 10;

/// Lowercased extension of a path, if any
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Whether the file extension (case-insensitive) is a supported image format
pub fn is_supported_image(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}
