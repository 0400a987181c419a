//! Model evaluation on a held-out split

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::dataset::LabeledImage;
use crate::model::ImageClassifier;
use crate::utils::logging::ProgressLogger;
use crate::utils::metrics::ModelMetrics;

/// Score every image of `images` and compute metrics against its label.
///
/// Images that cannot be scored, or whose label the model does not know, are
/// skipped with a warning and do not count towards `test_sample_count`.
pub fn evaluate<M: ImageClassifier + ?Sized>(model: &M, images: &[LabeledImage]) -> ModelMetrics {
    let class_names = model.class_names();
    let index: HashMap<&str, usize> = class_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    info!("Evaluating on {} images", images.len());
    let start = Instant::now();
    let mut progress = ProgressLogger::new("Evaluating", images.len());

    let mut actual = Vec::with_capacity(images.len());
    let mut scores = Vec::with_capacity(images.len());

    for image in images {
        progress.increment();

        let Some(&label) = index.get(image.label.as_str()) else {
            warn!("Skipping {:?}: label '{}' unknown to the model", image.path, image.label);
            continue;
        };

        match model.score(&image.path) {
            Ok(s) => {
                actual.push(label);
                scores.push(s);
            }
            Err(e) => warn!("Skipping {:?} during evaluation: {}", image.path, e),
        }
    }

    let metrics = ModelMetrics::from_scores(&actual, &scores, class_names.len());
    debug!(
        "Evaluated {} images in {:.2}s",
        metrics.test_sample_count,
        start.elapsed().as_secs_f64()
    );
    metrics
}
