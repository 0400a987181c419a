//! Image discovery
//!
//! Walks a class-per-directory dataset root and returns one `LabeledImage`
//! per supported image file. Labels come from the top-level class directory,
//! so images nested in sub-folders keep their class.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::dataset::{extension_of, is_supported_image};
use crate::utils::absolute_path;
use crate::utils::error::{RecognitionError, Result};

/// A single image with the class it was found under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabeledImage {
    /// Absolute path to the image file
    pub path: PathBuf,
    /// Name of the top-level class directory
    pub label: String,
}

impl LabeledImage {
    pub fn new(path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
        }
    }
}

/// Immediate subdirectories of `root`, sorted by name
pub fn list_class_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Class label of a class directory (its final path component)
pub fn class_label(class_dir: &Path) -> String {
    class_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// All supported images below `class_dir`, recursively, sorted and deduplicated.
///
/// Unreadable entries are skipped; this never fails.
pub fn find_class_images(class_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(class_dir)
        .min_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry under {:?}: {}", class_dir, e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_supported_image(path))
        .collect();

    files.sort();
    files.dedup();
    files
}

/// Number of directories nested anywhere below `class_dir`
fn count_nested_dirs(class_dir: &Path) -> usize {
    WalkDir::new(class_dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .count()
}

/// Per-extension file counts, e.g. `{".jpg": 12, ".png": 3}`
pub fn extension_histogram(files: &[PathBuf]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for file in files {
        let ext = extension_of(file).map(|e| format!(".{e}")).unwrap_or_default();
        *counts.entry(ext).or_insert(0) += 1;
    }
    counts
}

/// Discover all labeled images under `root`.
///
/// Returns the images sorted by path. Classes without any supported image are
/// skipped with a warning.
pub fn discover<P: AsRef<Path>>(root: P) -> Result<Vec<LabeledImage>> {
    let root = absolute_path(root.as_ref())?;
    info!("Loading images from {:?}", root);
    debug!("Supported formats: {}", crate::dataset::SUPPORTED_EXTENSIONS.join(", "));

    if !root.is_dir() {
        return Err(RecognitionError::DirectoryNotFound(root));
    }

    let class_dirs = list_class_dirs(&root)?;
    let mut images = Vec::new();

    for class_dir in &class_dirs {
        let label = class_label(class_dir);
        let files = find_class_images(class_dir);

        if files.is_empty() {
            warn!("No images found for '{}' in {:?}", label, class_dir);
            continue;
        }

        let nested = count_nested_dirs(class_dir);
        if nested > 0 {
            debug!("{}: found {} subdirectories with images", label, nested);
        }

        info!("{}: {} images (including subdirectories)", label, files.len());

        images.extend(
            files
                .into_iter()
                .map(|path| LabeledImage::new(path, label.clone())),
        );
    }

    images.sort_by(|a, b| a.path.cmp(&b.path));
    images.dedup_by(|a, b| a.path == b.path);

    info!(
        "Loaded {} images from {} classes",
        images.len(),
        class_dirs.len()
    );

    Ok(images)
}
