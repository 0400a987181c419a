//! # Fruit Recognition
//!
//! A Rust library for building image classifiers from class-per-directory
//! datasets: discovery, validation, splitting, training orchestration and
//! batch prediction.
//!
//! ## Modules
//!
//! - `dataset`: Image discovery, dataset validation, train/validation/test splits
//!   and image root resolution
//! - `model`: Classifier traits, the built-in centroid backend and configuration
//! - `backend`: Compute device selection and fit context
//! - `training`: Training orchestration with GPU/CPU fallback and evaluation
//! - `inference`: Single and batch prediction with summary statistics
//! - `utils`: Errors, logging, metrics and helper functions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fruit_recognition::dataset::{discover, validate};
//! use fruit_recognition::model::{CentroidBackend, ModelConfiguration};
//! use fruit_recognition::training::TrainingOrchestrator;
//!
//! let report = validate("data/dataset");
//! report.log();
//!
//! let images = discover("data/dataset")?;
//! let orchestrator = TrainingOrchestrator::new(CentroidBackend);
//! let outcome = orchestrator.train(&images, &ModelConfiguration::default())?;
//! orchestrator.save(&outcome, "models/model.json".as_ref())?;
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use backend::{Device, FitContext};
pub use dataset::{DatasetReport, DatasetSplits, LabeledImage, SplitFractions};
pub use inference::{BatchSummary, PredictionAggregator, PredictionRecord};
pub use model::{
    AppConfig, CentroidBackend, ClassifierBackend, ImageClassifier, ModelConfiguration, ModelSchema,
    PathConfiguration, TrainerOptions,
};
pub use training::{TrainingOrchestrator, TrainingOutcome};
pub use utils::error::{RecognitionError, Result};
pub use utils::metrics::{ConfusionMatrix, ModelMetrics};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
