//! Inference Predictor Module
//!
//! Runs single and batch predictions through a fitted `ImageClassifier` and
//! aggregates batch statistics.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::find_class_images;
use crate::model::{ClassifierBackend, ImageClassifier};
use crate::utils::error::{RecognitionError, Result};
use crate::utils::logging::ProgressLogger;
use crate::utils::metrics::argmax;

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub image_path: PathBuf,

    pub predicted_label: String,

    /// Probability per class, aligned to the model's class ordering
    pub score_per_class: Vec<f32>,

    /// Highest class probability as a percentage
    pub confidence: f32,

    pub inference_time_ms: f64,
}

impl PredictionRecord {
    /// Build a record from raw scores; the label is the highest scoring class
    pub fn from_scores(image_path: PathBuf, scores: Vec<f32>, class_names: &[String], inference_time_ms: f64) -> Self {
        let best = argmax(&scores);
        let confidence = scores.get(best).copied().unwrap_or(0.0) * 100.0;
        let predicted_label = class_names.get(best).cloned().unwrap_or_default();

        Self {
            image_path,
            predicted_label,
            score_per_class: scores,
            confidence,
            inference_time_ms,
        }
    }

    /// The `n` best classes with their probabilities, best first
    pub fn top_k(&self, class_names: &[String], n: usize) -> Vec<(String, f32)> {
        let mut ranked: Vec<(String, f32)> = class_names
            .iter()
            .cloned()
            .zip(self.score_per_class.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(n);
        ranked
    }
}

impl fmt::Display for PredictionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.image_path.display().to_string());
        write!(f, "{} -> {} ({:.1}%)", name, self.predicted_label, self.confidence)
    }
}

/// Aggregate statistics of one batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub count: usize,
    /// Mean confidence in percent, 0.0 for an empty batch
    pub average_confidence: f32,
    /// Predictions per label, most frequent first
    pub counts_by_label: Vec<(String, usize)>,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch Prediction Summary:")?;
        writeln!(f, "  Images: {}", self.count)?;
        writeln!(f, "  Average confidence: {:.1}%", self.average_confidence)?;
        for (label, count) in &self.counts_by_label {
            writeln!(f, "  {:<24} {:>5}", label, count)?;
        }
        Ok(())
    }
}

/// Aggregate confidence and per-label counts; ties keep first-seen order
pub fn summarize(records: &[PredictionRecord]) -> BatchSummary {
    if records.is_empty() {
        return BatchSummary::default();
    }

    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for record in records {
        match index.get(record.predicted_label.as_str()) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(record.predicted_label.as_str(), counts.len());
                counts.push((record.predicted_label.clone(), 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let total: f32 = records.iter().map(|r| r.confidence).sum();

    BatchSummary {
        count: records.len(),
        average_confidence: total / records.len() as f32,
        counts_by_label: counts,
    }
}

/// All supported images below `dir`, recursively and sorted
pub fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(RecognitionError::DirectoryNotFound(dir.to_path_buf()));
    }
    let images = find_class_images(dir);
    debug!("Found {} images in {:?}", images.len(), dir);
    Ok(images)
}

/// Load a persisted model through `backend`
pub fn load_model<B: ClassifierBackend>(backend: &B, path: &Path) -> Result<B::Model> {
    if !path.is_file() {
        return Err(RecognitionError::FileNotFound(path.to_path_buf()));
    }
    let model = backend.load(path)?;
    info!(
        "Loaded '{}' model with {} classes from {}",
        model.schema().architecture,
        model.class_names().len(),
        path.display()
    );
    Ok(model)
}

/// Runs predictions against one fitted model
pub struct PredictionAggregator<M: ImageClassifier> {
    model: M,
}

impl<M: ImageClassifier> PredictionAggregator<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn class_names(&self) -> &[String] {
        self.model.class_names()
    }

    /// Predict a single image
    pub fn predict_one(&self, path: &Path) -> Result<PredictionRecord> {
        if !path.exists() {
            return Err(RecognitionError::ImageNotFound(path.to_path_buf()));
        }

        let start = Instant::now();
        let scores = self
            .model
            .score(path)
            .map_err(|e| RecognitionError::PredictionFailed(path.to_path_buf(), e.to_string()))?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let class_names = self.model.class_names();
        if scores.is_empty() || scores.len() != class_names.len() {
            return Err(RecognitionError::PredictionFailed(
                path.to_path_buf(),
                format!("expected {} scores, got {}", class_names.len(), scores.len()),
            ));
        }

        Ok(PredictionRecord::from_scores(path.to_path_buf(), scores, class_names, elapsed_ms))
    }

    /// Predict every image; failures are logged and left out of the result
    pub fn predict_batch(&self, paths: &[PathBuf]) -> Vec<PredictionRecord> {
        let mut progress = ProgressLogger::new("Predicting", paths.len());
        let mut records = Vec::with_capacity(paths.len());

        for path in paths {
            match self.predict_one(path) {
                Ok(record) => {
                    debug!("{}", record);
                    records.push(record);
                }
                Err(e) => warn!("Error predicting {}: {}", path.display(), e),
            }
            progress.increment();
        }
        progress.finish();

        records
    }

    pub fn summarize(&self, records: &[PredictionRecord]) -> BatchSummary {
        summarize(records)
    }
}
