//! Image root resolution
//!
//! The classifier resolves every image path against a single base directory.
//! `resolve_common_root` infers that directory from a flat list of images by
//! walking up from the first image until a level holds several represented
//! class directories. The inference is a heuristic, so callers check the
//! result with `verify_common_root` before trusting it.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dataset::loader::LabeledImage;
use crate::utils::error::{RecognitionError, Result};

/// Infer the directory that contains the class directories of `images`.
///
/// Assumes class directories are siblings and at least two of them are
/// represented. When no such level exists the topmost directory examined is
/// returned.
pub fn resolve_common_root(images: &[LabeledImage]) -> Result<PathBuf> {
    let first = images.first().ok_or_else(|| {
        RecognitionError::Dataset("Cannot resolve the image root of an empty image set".to_string())
    })?;

    let mut directory = first
        .path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            RecognitionError::PathResolution(format!(
                "{} has no parent directory",
                first.path.display()
            ))
        })?;

    while let Some(parent) = directory.parent() {
        if parent.as_os_str().is_empty() {
            break;
        }

        let represented = represented_subdirs(parent, images);
        debug!("{}: {} represented subdirectories", parent.display(), represented);
        if represented > 1 {
            return Ok(parent.to_path_buf());
        }

        directory = parent.to_path_buf();
    }

    Ok(directory)
}

/// Immediate subdirectories of `dir` that strictly contain at least one image
fn represented_subdirs(dir: &Path, images: &[LabeledImage]) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|sub| sub.is_dir())
        .filter(|sub| {
            images
                .iter()
                .any(|img| img.path != *sub && img.path.starts_with(sub))
        })
        .count()
}

/// Check that every image lives under `root/<label>/`
pub fn verify_common_root(root: &Path, images: &[LabeledImage]) -> Result<()> {
    if images.is_empty() {
        return Err(RecognitionError::Dataset(
            "Cannot verify the image root of an empty image set".to_string(),
        ));
    }

    let misplaced: Vec<&LabeledImage> = images
        .iter()
        .filter(|img| !img.path.starts_with(root.join(&img.label)))
        .collect();

    match misplaced.first() {
        None => Ok(()),
        Some(example) => Err(RecognitionError::PathResolution(format!(
            "{} of {} images are not under {}/<label>/ (e.g. {} labeled '{}')",
            misplaced.len(),
            images.len(),
            root.display(),
            example.path.display(),
            example.label
        ))),
    }
}

/// Root implied by the labels: the parent of the nearest ancestor of the first
/// image that is named after its label
pub fn root_from_labels(images: &[LabeledImage]) -> Option<PathBuf> {
    let first = images.first()?;
    first
        .path
        .ancestors()
        .skip(1)
        .find(|dir| dir.file_name().map(|n| n.to_string_lossy() == first.label).unwrap_or(false))
        .and_then(Path::parent)
        .map(Path::to_path_buf)
}
