//! Classifier seam
//!
//! The pipeline never looks inside a classifier. Fitting and persistence go
//! through `ClassifierBackend`, scoring goes through `ImageClassifier`.
//! `centroid` is the built-in backend; `config` holds the configuration
//! surface that produces `TrainerOptions`.

pub mod centroid;
pub mod config;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::FitContext;
use crate::dataset::LabeledImage;
use crate::utils::error::Result;

pub use centroid::{CentroidBackend, CentroidModel};
pub use config::{AppConfig, ModelConfiguration, PathConfiguration};

/// Hyperparameters passed to a backend for one fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerOptions {
    pub architecture: String,
    pub image_width: u32,
    pub image_height: u32,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub use_transfer_learning: bool,
    pub l1_regularization: f64,
    pub l2_regularization: f64,
    pub max_iterations: usize,
}

/// Data handed to a backend for one fit
#[derive(Debug, Clone, Copy)]
pub struct FitRequest<'a> {
    pub train: &'a [LabeledImage],
    pub validation: &'a [LabeledImage],
    /// Base directory relative image paths resolve against
    pub image_root: &'a Path,
    /// Class ordering the fitted model must score in
    pub class_names: &'a [String],
    pub options: &'a TrainerOptions,
}

/// Descriptor persisted alongside a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub architecture: String,
    pub class_names: Vec<String>,
    pub image_width: u32,
    pub image_height: u32,
    pub image_root: PathBuf,
    /// RFC 3339 timestamp of the fit
    pub trained_at: String,
}

/// A fitted model that can score images
pub trait ImageClassifier {
    /// Class labels, in the order `score` reports them
    fn class_names(&self) -> &[String];

    /// Probability per class for one image, aligned to `class_names`
    fn score(&self, image: &Path) -> Result<Vec<f32>>;

    fn schema(&self) -> &ModelSchema;
}

/// Fits, saves and loads one kind of model
pub trait ClassifierBackend {
    type Model: ImageClassifier;

    /// Architecture name this backend implements
    fn architecture(&self) -> &str;

    fn fit(&self, request: &FitRequest<'_>, ctx: &FitContext) -> Result<Self::Model>;

    fn save(&self, model: &Self::Model, path: &Path) -> Result<()>;

    fn load(&self, path: &Path) -> Result<Self::Model>;
}
