//! Nearest-centroid classifier
//!
//! Every image is resized to the configured dimensions and flattened into
//! normalized RGB values. Fitting averages those vectors per class; scoring
//! turns the mean squared distance to every class centroid into a probability
//! distribution with a softmax. The model is stored as JSON together with its
//! schema.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{Device, FitContext};
use crate::model::{ClassifierBackend, FitRequest, ImageClassifier, ModelSchema};
use crate::utils::error::{RecognitionError, Result};
use crate::utils::logging::ProgressLogger;

pub const ARCHITECTURE: &str = "centroid";

/// Scale applied to distances before the softmax
const SHARPNESS: f32 = 50.0;

/// Fitted nearest-centroid model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidModel {
    schema: ModelSchema,
    /// Mean feature vector per class, empty for classes without training images
    centroids: Vec<Vec<f32>>,
}

impl CentroidModel {
    /// Number of classes that received at least one training image
    pub fn fitted_classes(&self) -> usize {
        self.centroids.iter().filter(|c| !c.is_empty()).count()
    }

    fn resolve(&self, image: &Path) -> PathBuf {
        resolve_image_path(&self.schema.image_root, image)
    }
}

impl ImageClassifier for CentroidModel {
    fn class_names(&self) -> &[String] {
        &self.schema.class_names
    }

    fn score(&self, image: &Path) -> Result<Vec<f32>> {
        let features = load_features(&self.resolve(image), self.schema.image_width, self.schema.image_height)?;
        Ok(softmax_scores(&features, &self.centroids))
    }

    fn schema(&self) -> &ModelSchema {
        &self.schema
    }
}

/// Backend producing `CentroidModel`s
#[derive(Debug, Clone, Copy, Default)]
pub struct CentroidBackend;

impl ClassifierBackend for CentroidBackend {
    type Model = CentroidModel;

    fn architecture(&self) -> &str {
        ARCHITECTURE
    }

    fn fit(&self, request: &FitRequest<'_>, ctx: &FitContext) -> Result<CentroidModel> {
        if let Device::Gpu(id) = ctx.device() {
            return Err(RecognitionError::Device(format!(
                "the centroid backend has no GPU implementation (requested GPU:{id})"
            )));
        }

        let options = request.options;
        if request.class_names.is_empty() {
            return Err(RecognitionError::Dataset("No classes to fit".to_string()));
        }

        debug!(
            "Centroid fit ignores epochs={}, batch_size={}, learning_rate={}",
            options.epochs, options.batch_size, options.learning_rate
        );

        let dim = options.image_width as usize * options.image_height as usize * 3;
        let index: HashMap<&str, usize> = request
            .class_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut sums = vec![vec![0.0f32; dim]; request.class_names.len()];
        let mut counts = vec![0usize; request.class_names.len()];
        let mut progress = ProgressLogger::new("Extracting features", request.train.len());

        for image in request.train {
            ctx.checkpoint()?;
            progress.increment();

            let Some(&class) = index.get(image.label.as_str()) else {
                warn!("Skipping {:?}: label '{}' is not a known class", image.path, image.label);
                continue;
            };

            let path = resolve_image_path(request.image_root, &image.path);
            match load_features(&path, options.image_width, options.image_height) {
                Ok(features) => {
                    for (sum, value) in sums[class].iter_mut().zip(&features) {
                        *sum += value;
                    }
                    counts[class] += 1;
                }
                Err(e) => warn!("Skipping unreadable training image: {}", e),
            }
        }
        progress.finish();

        if counts.iter().all(|&c| c == 0) {
            return Err(RecognitionError::Dataset(
                "None of the training images could be loaded".to_string(),
            ));
        }

        let centroids: Vec<Vec<f32>> = sums
            .into_iter()
            .zip(&counts)
            .zip(request.class_names)
            .map(|((mut sum, &count), name)| {
                if count == 0 {
                    warn!("Class '{}' has no training images and will never be predicted", name);
                    return Vec::new();
                }
                sum.iter_mut().for_each(|v| *v /= count as f32);
                sum
            })
            .collect();

        let model = CentroidModel {
            schema: ModelSchema {
                architecture: ARCHITECTURE.to_string(),
                class_names: request.class_names.to_vec(),
                image_width: options.image_width,
                image_height: options.image_height,
                image_root: request.image_root.to_path_buf(),
                trained_at: chrono::Utc::now().to_rfc3339(),
            },
            centroids,
        };

        info!(
            "Fitted {} of {} class centroids from {} images",
            model.fitted_classes(),
            request.class_names.len(),
            counts.iter().sum::<usize>()
        );

        Ok(model)
    }

    fn save(&self, model: &CentroidModel, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(model)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<CentroidModel> {
        if !path.exists() {
            return Err(RecognitionError::FileNotFound(path.to_path_buf()));
        }

        let json = std::fs::read_to_string(path)?;
        let model: CentroidModel = serde_json::from_str(&json)?;

        if model.schema.architecture != ARCHITECTURE {
            return Err(RecognitionError::Serialization(format!(
                "{} holds a '{}' model, expected '{}'",
                path.display(),
                model.schema.architecture,
                ARCHITECTURE
            )));
        }
        if model.centroids.len() != model.schema.class_names.len() {
            return Err(RecognitionError::Serialization(format!(
                "{} has {} centroids for {} classes",
                path.display(),
                model.centroids.len(),
                model.schema.class_names.len()
            )));
        }

        Ok(model)
    }
}

fn resolve_image_path(root: &Path, image: &Path) -> PathBuf {
    if image.is_absolute() {
        image.to_path_buf()
    } else {
        root.join(image)
    }
}

/// Decode, resize and flatten an image into RGB values in [0, 1]
pub fn load_features(path: &Path, width: u32, height: u32) -> Result<Vec<f32>> {
    let img = image::open(path).map_err(|e| RecognitionError::ImageLoad(path.to_path_buf(), e.to_string()))?;
    let rgb = img.resize_exact(width, height, FilterType::Triangle).to_rgb8();
    Ok(rgb.into_raw().into_iter().map(|v| f32::from(v) / 255.0).collect())
}

/// Softmax over negative mean squared distances; empty centroids score 0
fn softmax_scores(features: &[f32], centroids: &[Vec<f32>]) -> Vec<f32> {
    let logits: Vec<Option<f32>> = centroids
        .iter()
        .map(|centroid| {
            if centroid.is_empty() {
                return None;
            }
            let mse = centroid
                .iter()
                .zip(features)
                .map(|(c, f)| (c - f) * (c - f))
                .sum::<f32>()
                / centroid.len() as f32;
            Some(-SHARPNESS * mse)
        })
        .collect();

    let max = logits.iter().flatten().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits
        .iter()
        .map(|logit| logit.map(|l| (l - max).exp()).unwrap_or(0.0))
        .collect();
    let sum: f32 = exps.iter().sum();

    if sum > 0.0 {
        exps.into_iter().map(|e| e / sum).collect()
    } else {
        vec![0.0; centroids.len()]
    }
}
