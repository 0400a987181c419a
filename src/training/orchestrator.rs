//! Training orchestration
//!
//! Drives a `ClassifierBackend` through split, root resolution, fit,
//! evaluation, overfitting check and persistence.
//!
//! ## Device policy
//!
//! | `use_gpu` | `fallback_to_cpu` | fit fails on first device            |
//! |-----------|-------------------|--------------------------------------|
//! | false     | any               | `TrainingFailed`                     |
//! | true      | false             | `TrainingFailed`, no retry           |
//! | true      | true              | one retry on CPU, `TrainingFailed` if that fails too |
//!
//! A cancelled or timed-out fit is never retried.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::backend::{Device, FitContext};
use crate::dataset::{
    resolve_common_root, root_from_labels, verify_common_root, DatasetSplits, LabeledImage,
};
use crate::model::{ClassifierBackend, FitRequest, ModelConfiguration};
use crate::training::evaluator::evaluate;
use crate::training::OVERFITTING_THRESHOLD;
use crate::utils::error::{RecognitionError, Result};
use crate::utils::metrics::ModelMetrics;
use crate::utils::{format_duration, format_megabytes};

/// Everything a successful training run produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome<M> {
    pub model: M,
    /// Metrics on the test split, with timing and sample counts filled in
    pub metrics: ModelMetrics,
    /// Metrics on the validation split, `None` when it was empty
    pub validation_metrics: Option<ModelMetrics>,
    pub splits: DatasetSplits,
    /// Base directory the images were resolved against
    pub image_root: PathBuf,
    /// Device the successful fit ran on
    pub device: Device,
    pub overfitting_suspected: bool,
}

/// Runs training end to end against one classifier backend
pub struct TrainingOrchestrator<B: ClassifierBackend> {
    backend: B,
    cancelled: Arc<AtomicBool>,
}

impl<B: ClassifierBackend> TrainingOrchestrator<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Flag that aborts a running fit at its next checkpoint when set
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Train, evaluate and check a model on `images`
    pub fn train(&self, images: &[LabeledImage], config: &ModelConfiguration) -> Result<TrainingOutcome<B::Model>> {
        config.validate()?;
        if config.architecture != self.backend.architecture() {
            return Err(RecognitionError::Config(format!(
                "Architecture '{}' is not provided by the '{}' backend",
                config.architecture,
                self.backend.architecture()
            )));
        }

        info!("Splitting {} images", images.len());
        let splits = DatasetSplits::plan(images, config.split_fractions()?, config.seed)?;
        info!("{}", splits.stats());

        if splits.train.is_empty() {
            return Err(RecognitionError::Dataset(
                "Training split is empty, add more images or lower the held-out fractions".to_string(),
            ));
        }

        if splits.test.is_empty() {
            return Err(RecognitionError::Dataset(format!(
                "Test split is empty ({} images at test fraction {}), add more images or raise test_fraction",
                splits.total_images,
                splits.fractions.test()
            )));
        }

        let image_root = self.resolve_image_root(images)?;
        info!("Using base image path: {}", image_root.display());

        let options = config.trainer_options();
        let request = FitRequest {
            train: &splits.train,
            validation: &splits.validation,
            image_root: &image_root,
            class_names: &splits.class_names,
            options: &options,
        };

        let mut ctx = FitContext::new(config.device()).with_cancel_flag(self.cancel_handle());
        if let Some(timeout) = config.fit_timeout() {
            ctx = ctx.with_timeout(timeout);
        }

        let start = Instant::now();
        let (model, device) = self.fit_with_policy(&request, &ctx, config.fallback_to_cpu)?;
        let fit_seconds = start.elapsed().as_secs_f64();

        info!(
            "Fit completed on {} in {} ({:.1} images/s)",
            device,
            format_duration(fit_seconds),
            splits.train.len() as f64 / fit_seconds.max(f64::EPSILON)
        );

        let validation_metrics = if splits.validation.is_empty() {
            debug!("Validation split is empty, skipping overfitting check");
            None
        } else {
            Some(evaluate(&model, &splits.validation))
        };

        let overfitting_suspected = validation_metrics
            .as_ref()
            .map(|m| m.micro_accuracy > OVERFITTING_THRESHOLD)
            .unwrap_or(false);
        if let Some(m) = &validation_metrics {
            info!(
                "Validation micro accuracy: {:.2}%, log loss: {:.4}",
                m.micro_accuracy * 100.0,
                m.log_loss
            );
            if overfitting_suspected {
                warn!(
                    "Validation accuracy {:.2}% is above {:.0}%, the model may be overfitting",
                    m.micro_accuracy * 100.0,
                    OVERFITTING_THRESHOLD * 100.0
                );
            }
        }

        let mut metrics = evaluate(&model, &splits.test);
        metrics.training_time_seconds = fit_seconds;
        metrics.training_sample_count = images.len();
        if metrics.test_sample_count < splits.test.len() {
            warn!(
                "Only {} of {} test images could be scored",
                metrics.test_sample_count,
                splits.test.len()
            );
        }

        Ok(TrainingOutcome {
            model,
            metrics,
            validation_metrics,
            splits,
            image_root,
            device,
            overfitting_suspected,
        })
    }

    /// Persist the trained model, creating the destination directory
    pub fn save(&self, outcome: &TrainingOutcome<B::Model>, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        self.backend.save(&outcome.model, path)?;

        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        info!("Model saved to {} ({})", path.display(), format_megabytes(size));
        Ok(())
    }

    /// Infer the image root, falling back to the label-implied root when the
    /// heuristic picks a directory that does not hold the class directories
    fn resolve_image_root(&self, images: &[LabeledImage]) -> Result<PathBuf> {
        let inferred = resolve_common_root(images)?;
        let error = match verify_common_root(&inferred, images) {
            Ok(()) => return Ok(inferred),
            Err(e) => e,
        };

        if let Some(candidate) = root_from_labels(images) {
            if verify_common_root(&candidate, images).is_ok() {
                warn!(
                    "Inferred image root {} does not contain the class directories, using {}",
                    inferred.display(),
                    candidate.display()
                );
                return Ok(candidate);
            }
        }

        Err(error)
    }

    fn fit_with_policy(
        &self,
        request: &FitRequest<'_>,
        ctx: &FitContext,
        fallback_to_cpu: bool,
    ) -> Result<(B::Model, Device)> {
        let device = ctx.device();
        info!(
            "Fitting '{}' on {} ({} training, {} validation images)",
            request.options.architecture,
            device,
            request.train.len(),
            request.validation.len()
        );

        let error = match self.backend.fit(request, ctx) {
            Ok(model) => return Ok((model, device)),
            Err(e) => e,
        };

        if let RecognitionError::Cancelled(_) = error {
            return Err(RecognitionError::training("Fit was aborted", error));
        }

        if !device.is_gpu() {
            return Err(RecognitionError::training(format!("Fit on {device} failed"), error));
        }

        if !fallback_to_cpu {
            return Err(RecognitionError::training(
                format!("Fit on {device} failed and CPU fallback is disabled"),
                error,
            ));
        }

        warn!("Fit on {} failed: {}. Retrying on CPU", device, error);
        let cpu = ctx.on_device(Device::Cpu);
        self.backend
            .fit(request, &cpu)
            .map(|model| (model, Device::Cpu))
            .map_err(|e| RecognitionError::training("CPU fallback fit failed", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageClassifier, ModelSchema};
    use std::cell::RefCell;
    use std::error::Error as _;
    use std::fs;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    /// Predicts the class whose name appears in the image path
    #[derive(Debug, Clone)]
    struct PathModel {
        schema: ModelSchema,
        /// Images scored as the wrong class
        misses: Vec<PathBuf>,
    }

    impl ImageClassifier for PathModel {
        fn class_names(&self) -> &[String] {
            &self.schema.class_names
        }

        fn score(&self, image: &Path) -> Result<Vec<f32>> {
            let class = self
                .schema
                .class_names
                .iter()
                .position(|name| image.components().any(|c| c.as_os_str() == name.as_str()))
                .ok_or_else(|| RecognitionError::PredictionFailed(image.to_path_buf(), "no class".to_string()))?;
            let n = self.schema.class_names.len();
            let class = if self.misses.iter().any(|p| p == image) {
                (class + 1) % n
            } else {
                class
            };
            let mut scores = vec![0.0; n];
            scores[class] = 1.0;
            Ok(scores)
        }

        fn schema(&self) -> &ModelSchema {
            &self.schema
        }
    }

    #[derive(Default)]
    struct MockBackend {
        fail_on_gpu: bool,
        fail_on_cpu: bool,
        /// Number of validation images the fitted model gets wrong
        validation_misses: usize,
        attempts: RefCell<Vec<Device>>,
    }

    impl ClassifierBackend for MockBackend {
        type Model = PathModel;

        fn architecture(&self) -> &str {
            "centroid"
        }

        fn fit(&self, request: &FitRequest<'_>, ctx: &FitContext) -> Result<PathModel> {
            self.attempts.borrow_mut().push(ctx.device());
            ctx.checkpoint()?;
            match ctx.device() {
                Device::Gpu(_) if self.fail_on_gpu => Err(RecognitionError::Device("no GPU".to_string())),
                Device::Cpu if self.fail_on_cpu => Err(RecognitionError::Device("CPU fit failed".to_string())),
                _ => Ok(PathModel {
                    schema: ModelSchema {
                        architecture: "centroid".to_string(),
                        class_names: request.class_names.to_vec(),
                        image_width: request.options.image_width,
                        image_height: request.options.image_height,
                        image_root: request.image_root.to_path_buf(),
                        trained_at: chrono::Utc::now().to_rfc3339(),
                    },
                    misses: request
                        .validation
                        .iter()
                        .take(self.validation_misses)
                        .map(|img| img.path.clone())
                        .collect(),
                }),
            }
        }

        fn save(&self, model: &PathModel, path: &Path) -> Result<()> {
            fs::write(path, serde_json::to_string(&model.schema)?)?;
            Ok(())
        }

        fn load(&self, path: &Path) -> Result<PathModel> {
            let schema = serde_json::from_str(&fs::read_to_string(path)?)?;
            Ok(PathModel {
                schema,
                misses: Vec::new(),
            })
        }
    }

    fn dataset(root: &Path, layout: &[(&str, usize)]) -> Vec<LabeledImage> {
        let mut images = Vec::new();
        for (dir, count) in layout {
            let class_dir = root.join(dir);
            fs::create_dir_all(&class_dir).unwrap();
            let label = dir.split('/').next().unwrap();
            for i in 0..*count {
                let path = class_dir.join(format!("img_{i}.jpg"));
                fs::write(&path, b"jpg").unwrap();
                images.push(LabeledImage::new(path, label));
            }
        }
        images
    }

    fn gpu_config(fallback_to_cpu: bool) -> ModelConfiguration {
        ModelConfiguration {
            use_gpu: true,
            fallback_to_cpu,
            ..Default::default()
        }
    }

    #[test]
    fn test_cpu_training_outcome() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("fruits");
        let images = dataset(&root, &[("apple", 10), ("pear", 10)]);

        let orchestrator = TrainingOrchestrator::new(MockBackend::default());
        let outcome = orchestrator.train(&images, &ModelConfiguration::default()).unwrap();

        assert_eq!(outcome.image_root, root);
        assert_eq!(outcome.device, Device::Cpu);
        assert_eq!(outcome.splits.train.len(), 14);
        assert_eq!(outcome.metrics.training_sample_count, 20);
        assert_eq!(outcome.metrics.test_sample_count, outcome.splits.test.len());
        assert_eq!(outcome.metrics.number_of_classes, 2);
        assert!(outcome.metrics.training_time_seconds >= 0.0);
        assert_eq!(outcome.metrics.micro_accuracy, 1.0);
        // a perfect validation score is flagged
        assert!(outcome.overfitting_suspected);
        assert_eq!(*orchestrator.backend().attempts.borrow(), vec![Device::Cpu]);
    }

    #[test]
    fn test_gpu_failure_without_fallback() {
        let dir = TempDir::new().unwrap();
        let images = dataset(dir.path(), &[("apple", 10), ("pear", 10)]);
        let backend = MockBackend {
            fail_on_gpu: true,
            ..Default::default()
        };

        let orchestrator = TrainingOrchestrator::new(backend);
        let err = orchestrator.train(&images, &gpu_config(false)).unwrap_err();

        assert!(matches!(err, RecognitionError::TrainingFailed { .. }));
        assert!(err.to_string().contains("CPU fallback is disabled"));
        assert!(matches!(err.source(), Some(_)));
        assert_eq!(*orchestrator.backend().attempts.borrow(), vec![Device::Gpu(0)]);
    }

    #[test]
    fn test_gpu_failure_falls_back_to_cpu() {
        let dir = TempDir::new().unwrap();
        let images = dataset(dir.path(), &[("apple", 10), ("pear", 10)]);
        let backend = MockBackend {
            fail_on_gpu: true,
            ..Default::default()
        };

        let orchestrator = TrainingOrchestrator::new(backend);
        let outcome = orchestrator.train(&images, &gpu_config(true)).unwrap();

        assert_eq!(outcome.device, Device::Cpu);
        assert_eq!(
            *orchestrator.backend().attempts.borrow(),
            vec![Device::Gpu(0), Device::Cpu]
        );
    }

    #[test]
    fn test_fallback_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let images = dataset(dir.path(), &[("apple", 10), ("pear", 10)]);
        let backend = MockBackend {
            fail_on_gpu: true,
            fail_on_cpu: true,
            ..Default::default()
        };

        let orchestrator = TrainingOrchestrator::new(backend);
        let err = orchestrator.train(&images, &gpu_config(true)).unwrap_err();

        assert!(err.to_string().contains("CPU fallback fit failed"));
        assert_eq!(orchestrator.backend().attempts.borrow().len(), 2);
    }

    #[test]
    fn test_cpu_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let images = dataset(dir.path(), &[("apple", 10), ("pear", 10)]);
        let backend = MockBackend {
            fail_on_cpu: true,
            ..Default::default()
        };

        let orchestrator = TrainingOrchestrator::new(backend);
        let err = orchestrator.train(&images, &ModelConfiguration::default()).unwrap_err();
        assert!(matches!(err, RecognitionError::TrainingFailed { .. }));
        assert_eq!(orchestrator.backend().attempts.borrow().len(), 1);
    }

    #[test]
    fn test_cancelled_fit_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let images = dataset(dir.path(), &[("apple", 10), ("pear", 10)]);

        let orchestrator = TrainingOrchestrator::new(MockBackend::default());
        orchestrator.cancel_handle().store(true, Ordering::SeqCst);
        let err = orchestrator.train(&images, &gpu_config(true)).unwrap_err();

        assert!(err.to_string().contains("aborted"));
        assert_eq!(orchestrator.backend().attempts.borrow().len(), 1);
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let dir = TempDir::new().unwrap();
        let images = dataset(dir.path(), &[("apple", 10), ("pear", 10)]);
        let config = ModelConfiguration {
            test_fraction: 0.8,
            validation_fraction: 0.3,
            ..Default::default()
        };

        let orchestrator = TrainingOrchestrator::new(MockBackend::default());
        let err = orchestrator.train(&images, &config).unwrap_err();

        assert!(matches!(err, RecognitionError::Config(_)));
        assert!(orchestrator.backend().attempts.borrow().is_empty());
    }

    #[test]
    fn test_unknown_architecture_rejected() {
        let dir = TempDir::new().unwrap();
        let images = dataset(dir.path(), &[("apple", 10), ("pear", 10)]);
        let config = ModelConfiguration {
            architecture: "resnet".to_string(),
            ..Default::default()
        };

        let orchestrator = TrainingOrchestrator::new(MockBackend::default());
        assert!(matches!(
            orchestrator.train(&images, &config),
            Err(RecognitionError::Config(_))
        ));
    }

    #[test]
    fn test_nested_class_directories_resolve_to_dataset_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("fruits");
        let images = dataset(
            &root,
            &[("apple/batch_1", 6), ("apple/batch_2", 6), ("pear", 10)],
        );

        let orchestrator = TrainingOrchestrator::new(MockBackend::default());
        let outcome = orchestrator.train(&images, &ModelConfiguration::default()).unwrap();
        assert_eq!(outcome.image_root, root);
    }

    #[test]
    fn test_save_creates_directories() {
        let dir = TempDir::new().unwrap();
        let images = dataset(&dir.path().join("data"), &[("apple", 10), ("pear", 10)]);

        let orchestrator = TrainingOrchestrator::new(MockBackend::default());
        let outcome = orchestrator.train(&images, &ModelConfiguration::default()).unwrap();

        let path = dir.path().join("out/models/model.json");
        orchestrator.save(&outcome, &path).unwrap();
        assert!(path.exists());

        let loaded = orchestrator.backend().load(&path).unwrap();
        assert_eq!(loaded.class_names(), outcome.model.class_names());
    }

    #[test]
    fn test_empty_test_split_is_rejected() {
        let dir = TempDir::new().unwrap();
        let images = dataset(dir.path(), &[("apple", 5), ("pear", 5)]);
        let config = ModelConfiguration {
            test_fraction: 0.04,
            validation_fraction: 0.0,
            ..Default::default()
        };

        let orchestrator = TrainingOrchestrator::new(MockBackend::default());
        let err = orchestrator.train(&images, &config).unwrap_err();

        assert!(matches!(err, RecognitionError::Dataset(_)));
        assert!(err.to_string().contains("Test split is empty"));
        assert!(orchestrator.backend().attempts.borrow().is_empty());
    }

    #[test]
    fn test_imperfect_validation_is_not_flagged() {
        let dir = TempDir::new().unwrap();
        let images = dataset(dir.path(), &[("apple", 50), ("pear", 50)]);
        let backend = MockBackend {
            validation_misses: 1,
            ..Default::default()
        };

        let orchestrator = TrainingOrchestrator::new(backend);
        let outcome = orchestrator.train(&images, &ModelConfiguration::default()).unwrap();

        let validation = outcome.validation_metrics.as_ref().unwrap();
        assert_eq!(validation.test_sample_count, 10);
        assert!((validation.micro_accuracy - 0.9).abs() < 1e-9);
        assert!(!outcome.overfitting_suspected);
    }

    #[test]
    fn test_accuracy_at_threshold_is_not_flagged() {
        let dir = TempDir::new().unwrap();
        let images = dataset(dir.path(), &[("apple", 250), ("pear", 250)]);
        let backend = MockBackend {
            validation_misses: 1,
            ..Default::default()
        };

        let orchestrator = TrainingOrchestrator::new(backend);
        let outcome = orchestrator.train(&images, &ModelConfiguration::default()).unwrap();

        let validation = outcome.validation_metrics.as_ref().unwrap();
        assert_eq!(validation.test_sample_count, 50);
        assert_eq!(validation.micro_accuracy, 49.0 / 50.0);
        assert!(validation.micro_accuracy <= OVERFITTING_THRESHOLD);
        assert!(!outcome.overfitting_suspected);
    }

    #[test]
    fn test_empty_validation_skips_overfitting_check() {
        let dir = TempDir::new().unwrap();
        let images = dataset(dir.path(), &[("apple", 10), ("pear", 10)]);
        let config = ModelConfiguration {
            validation_fraction: 0.0,
            ..Default::default()
        };

        let orchestrator = TrainingOrchestrator::new(MockBackend::default());
        let outcome = orchestrator.train(&images, &config).unwrap();

        assert!(outcome.splits.validation.is_empty());
        assert!(outcome.validation_metrics.is_none());
        assert!(!outcome.overfitting_suspected);
        assert_eq!(outcome.metrics.micro_accuracy, 1.0);
    }
}
