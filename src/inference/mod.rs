//! Inference module for prediction on saved models
//!
//! This module provides:
//! - Single image and batch prediction
//! - Batch statistics (average confidence, predictions per class)
//! - Helpers to load a saved model and gather images to identify

pub mod predictor;

pub use predictor::{
    collect_images, load_model, summarize, BatchSummary, PredictionAggregator, PredictionRecord,
};

/// Number of classes listed for a single-image prediction
pub const TOP_K: usize = 3;
