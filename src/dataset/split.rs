//! Train/validation/test splitting
//!
//! Two configured fractions drive a two-stage split:
//! 1. **Held-out carve** - `test + validation` of the full set is set aside,
//!    the remainder becomes the training set
//! 2. **Test carve** - `test / (test + validation)` of the held-out set becomes
//!    the test set, the remainder becomes the validation set
//!
//! Membership is decided per item from a key derived from the seed, the stage
//! and the image path through `ChaCha8Rng`. The same seed always yields the same
//! partitions, whatever order the images were discovered in.

use std::collections::BTreeSet;
use std::path::Path;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::loader::LabeledImage;
use crate::utils::error::{RecognitionError, Result};

const HELD_OUT_STAGE: u8 = 1;
const TEST_STAGE: u8 = 2;

/// Test and validation fractions of the full data set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitFractions {
    test: f64,
    validation: f64,
}

impl Default for SplitFractions {
    fn default() -> Self {
        Self {
            test: 0.2,
            validation: 0.1,
        }
    }
}

impl SplitFractions {
    /// Create split fractions, rejecting combinations that leave no training data
    pub fn new(test: f64, validation: f64) -> Result<Self> {
        if !(test > 0.0 && test < 1.0) {
            return Err(RecognitionError::Config(format!(
                "Test fraction must be in (0, 1), got {test}"
            )));
        }

        if !(validation >= 0.0 && validation < 1.0) {
            return Err(RecognitionError::Config(format!(
                "Validation fraction must be in [0, 1), got {validation}"
            )));
        }

        if test + validation >= 1.0 {
            return Err(RecognitionError::Config(format!(
                "Test + validation fractions must be less than 1.0, got {}",
                test + validation
            )));
        }

        Ok(Self { test, validation })
    }

    pub fn test(&self) -> f64 {
        self.test
    }

    pub fn validation(&self) -> f64 {
        self.validation
    }

    /// Fraction left for training
    pub fn train(&self) -> f64 {
        1.0 - self.test - self.validation
    }

    /// Fraction carved off in the first stage
    pub fn held_out(&self) -> f64 {
        self.test + self.validation
    }

    /// Share of the held-out set that becomes the test set
    pub fn test_share_of_held_out(&self) -> f64 {
        self.test / self.held_out()
    }
}

/// The three disjoint partitions of a data set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSplits {
    pub train: Vec<LabeledImage>,
    pub validation: Vec<LabeledImage>,
    pub test: Vec<LabeledImage>,

    /// Fractions used to create these splits
    pub fractions: SplitFractions,

    /// Seed actually used (drawn at random when none was configured)
    pub seed: u64,

    /// Sorted class labels present in the full data set
    pub class_names: Vec<String>,

    /// Number of images that were split
    pub total_images: usize,
}

impl DatasetSplits {
    /// Split `images` into train/validation/test.
    ///
    /// With `seed == None` a fresh seed is drawn and logged so the run can be
    /// reproduced afterwards.
    pub fn plan(images: &[LabeledImage], fractions: SplitFractions, seed: Option<u64>) -> Result<Self> {
        if images.is_empty() {
            return Err(RecognitionError::Dataset(
                "No images provided for splitting".to_string(),
            ));
        }

        let seed = match seed {
            Some(seed) => seed,
            None => {
                let seed: u64 = rand::thread_rng().gen();
                info!("No seed configured, using random seed {}", seed);
                seed
            }
        };

        let class_names: Vec<String> = images
            .iter()
            .map(|img| img.label.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let (held_out, mut train) = carve(images.to_vec(), fractions.held_out(), seed, HELD_OUT_STAGE);
        let (mut test, mut validation) =
            carve(held_out, fractions.test_share_of_held_out(), seed, TEST_STAGE);

        for part in [&mut train, &mut validation, &mut test] {
            part.sort_by(|a, b| a.path.cmp(&b.path));
        }

        let splits = Self {
            train,
            validation,
            test,
            fractions,
            seed,
            class_names,
            total_images: images.len(),
        };

        debug!("{}", splits.stats());
        Ok(splits)
    }

    /// Get statistics about the splits
    pub fn stats(&self) -> SplitStats {
        SplitStats {
            total_images: self.total_images,
            train_size: self.train.len(),
            validation_size: self.validation.len(),
            test_size: self.test.len(),
            num_classes: self.class_names.len(),
            seed: self.seed,
        }
    }

    /// Save splits to a JSON file for reproducibility
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load splits from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RecognitionError::FileNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Move the `round(n * fraction)` lowest-keyed items into the first vector
fn carve(items: Vec<LabeledImage>, fraction: f64, seed: u64, stage: u8) -> (Vec<LabeledImage>, Vec<LabeledImage>) {
    let n = items.len();
    let take = ((n as f64 * fraction).round() as usize).min(n);

    let mut keyed: Vec<(u64, LabeledImage)> = items
        .into_iter()
        .map(|img| (item_key(seed, stage, &img.path), img))
        .collect();
    keyed.sort_by(|(ka, a), (kb, b)| ka.cmp(kb).then_with(|| a.path.cmp(&b.path)));

    let mut carved: Vec<LabeledImage> = keyed.into_iter().map(|(_, img)| img).collect();
    let rest = carved.split_off(take);
    (carved, rest)
}

/// Pseudo-random sort key of one image for one split stage
fn item_key(seed: u64, stage: u8, path: &Path) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let bytes = path.to_string_lossy();
    for byte in std::iter::once(stage).chain(bytes.bytes()) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    ChaCha8Rng::seed_from_u64(seed ^ hash).gen()
}

/// Statistics about dataset splits
#[derive(Debug, Clone)]
pub struct SplitStats {
    pub total_images: usize,
    pub train_size: usize,
    pub validation_size: usize,
    pub test_size: usize,
    pub num_classes: usize,
    pub seed: u64,
}

impl SplitStats {
    fn percent(&self, size: usize) -> f64 {
        if self.total_images == 0 {
            0.0
        } else {
            100.0 * size as f64 / self.total_images as f64
        }
    }
}

impl std::fmt::Display for SplitStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Dataset Split Statistics:")?;
        writeln!(f, "  Total images: {}", self.total_images)?;
        writeln!(f, "  Number of classes: {}", self.num_classes)?;
        writeln!(f, "  Seed: {}", self.seed)?;
        writeln!(f, "  Training set: {} ({:.1}%)", self.train_size, self.percent(self.train_size))?;
        writeln!(f, "  Validation set: {} ({:.1}%)", self.validation_size, self.percent(self.validation_size))?;
        write!(f, "  Test set: {} ({:.1}%)", self.test_size, self.percent(self.test_size))
    }
}
