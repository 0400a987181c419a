//! Training module
//!
//! This module provides:
//! - The training orchestrator (split, root resolution, fit with GPU/CPU
//!   fallback, evaluation, overfitting check, persistence)
//! - Evaluation of a fitted classifier on a held-out split
//!
//! ## Pipeline
//!
//! 1. Validate the configuration
//! 2. Split the images into train/validation/test
//! 3. Resolve and verify the common image root
//! 4. Fit through the classifier backend
//! 5. Evaluate on the validation split and warn about overfitting
//! 6. Evaluate on the test split and record timing/sample counts
//! 7. Save the model

pub mod evaluator;
pub mod orchestrator;

pub use evaluator::evaluate;
pub use orchestrator::{TrainingOrchestrator, TrainingOutcome};

/// Validation micro accuracy above this suggests the model memorized the data
pub const OVERFITTING_THRESHOLD: f64 = 0.98;
