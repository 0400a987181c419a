//! Model Configuration Module
//!
//! Defines the configuration surface for training and prediction:
//! image dimensions, split fractions, hyperparameters, device policy and the
//! dataset/model paths. Configuration can be loaded from a TOML file; any
//! field left out takes its default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::Device;
use crate::dataset::SplitFractions;
use crate::model::TrainerOptions;
use crate::utils::absolute_path;
use crate::utils::error::{RecognitionError, Result};

/// Training and device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfiguration {
    /// Width images are resized to before fitting
    pub image_width: u32,

    /// Height images are resized to before fitting
    pub image_height: u32,

    /// Fraction of all images held out for the final test evaluation
    pub test_fraction: f64,

    /// Fraction of all images held out for the overfitting check
    pub validation_fraction: f64,

    /// Split seed. Omitting it from a config file makes splits non-reproducible.
    #[serde(default)]
    pub seed: Option<u64>,

    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,

    /// Classifier architecture, must match the backend doing the fit
    pub architecture: String,

    pub use_transfer_learning: bool,

    /// Request a GPU fit
    pub use_gpu: bool,

    /// GPU index when `use_gpu` is set
    pub device_id: usize,

    /// Retry once on CPU when a GPU fit fails
    pub fallback_to_cpu: bool,

    pub l1_regularization: f64,
    pub l2_regularization: f64,
    pub max_iterations: usize,

    /// Abort fits that run longer than this many seconds
    pub fit_timeout_secs: Option<u64>,
}

impl Default for ModelConfiguration {
    fn default() -> Self {
        Self {
            image_width: 224,
            image_height: 224,
            test_fraction: 0.2,
            validation_fraction: 0.1,
            seed: Some(42),
            epochs: 200,
            batch_size: 32,
            learning_rate: 0.001,
            architecture: "centroid".to_string(),
            use_transfer_learning: false,
            use_gpu: false,
            device_id: 0,
            fallback_to_cpu: false,
            l1_regularization: 0.1,
            l2_regularization: 0.2,
            max_iterations: 100,
            fit_timeout_secs: None,
        }
    }
}

impl ModelConfiguration {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.image_width == 0 || self.image_height == 0 {
            return Err(RecognitionError::Config(format!(
                "Image dimensions must be positive, got {}x{}",
                self.image_width, self.image_height
            )));
        }

        self.split_fractions()?;

        if self.epochs == 0 {
            return Err(RecognitionError::Config("epochs must be greater than 0".to_string()));
        }

        if self.batch_size == 0 {
            return Err(RecognitionError::Config("batch_size must be greater than 0".to_string()));
        }

        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(RecognitionError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }

        if self.l1_regularization < 0.0 || self.l2_regularization < 0.0 {
            return Err(RecognitionError::Config(
                "Regularization strengths must be non-negative".to_string(),
            ));
        }

        if self.architecture.trim().is_empty() {
            return Err(RecognitionError::Config("architecture must not be empty".to_string()));
        }

        if self.fit_timeout_secs == Some(0) {
            return Err(RecognitionError::Config(
                "fit_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Validated split fractions
    pub fn split_fractions(&self) -> Result<SplitFractions> {
        SplitFractions::new(self.test_fraction, self.validation_fraction)
    }

    /// Device requested for the first fit attempt
    pub fn device(&self) -> Device {
        Device::from_config(self.use_gpu, self.device_id)
    }

    pub fn fit_timeout(&self) -> Option<Duration> {
        self.fit_timeout_secs.map(Duration::from_secs)
    }

    /// Hyperparameters handed to the classifier backend
    pub fn trainer_options(&self) -> TrainerOptions {
        TrainerOptions {
            architecture: self.architecture.clone(),
            image_width: self.image_width,
            image_height: self.image_height,
            epochs: self.epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            use_transfer_learning: self.use_transfer_learning,
            l1_regularization: self.l1_regularization,
            l2_regularization: self.l2_regularization,
            max_iterations: self.max_iterations,
        }
    }
}

/// Where the dataset, the model and the images to identify live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfiguration {
    pub dataset_path: PathBuf,
    pub model_path: PathBuf,
    pub test_images_path: PathBuf,
}

impl Default for PathConfiguration {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("data/dataset"),
            model_path: PathBuf::from("models/model.json"),
            test_images_path: PathBuf::from("data/identification"),
        }
    }
}

impl PathConfiguration {
    /// Resolve relative paths against the current directory
    pub fn make_absolute(&mut self) -> Result<()> {
        self.dataset_path = absolute_path(&self.dataset_path)?;
        self.model_path = absolute_path(&self.model_path)?;
        self.test_images_path = absolute_path(&self.test_images_path)?;
        Ok(())
    }
}

/// Full application configuration, as read from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfiguration,
    pub paths: PathConfiguration,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecognitionError::Config(format!("Failed to read config {}: {e}", path.display())))?;

        Self::from_toml(&content)
            .map_err(|e| RecognitionError::Config(format!("Failed to parse config {}: {e}", path.display())))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load from `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Serialize configuration to TOML text
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RecognitionError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ModelConfiguration::default();
        assert_eq!(config.image_width, 224);
        assert_eq!(config.image_height, 224);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.epochs, 200);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.architecture, "centroid");
        assert!(!config.use_gpu);
        assert!(!config.fallback_to_cpu);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_fractions() {
        let config = ModelConfiguration {
            test_fraction: 0.7,
            validation_fraction: 0.3,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RecognitionError::Config(_))));

        let config = ModelConfiguration {
            test_fraction: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_hyperparameters() {
        for config in [
            ModelConfiguration { image_width: 0, ..Default::default() },
            ModelConfiguration { epochs: 0, ..Default::default() },
            ModelConfiguration { batch_size: 0, ..Default::default() },
            ModelConfiguration { learning_rate: -0.1, ..Default::default() },
            ModelConfiguration { l2_regularization: -1.0, ..Default::default() },
            ModelConfiguration { architecture: " ".to_string(), ..Default::default() },
            ModelConfiguration { fit_timeout_secs: Some(0), ..Default::default() },
        ] {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
    }

    #[test]
    fn test_device_and_options() {
        let config = ModelConfiguration {
            use_gpu: true,
            device_id: 1,
            image_width: 64,
            ..Default::default()
        };
        assert_eq!(config.device(), Device::Gpu(1));

        let options = config.trainer_options();
        assert_eq!(options.image_width, 64);
        assert_eq!(options.architecture, "centroid");
        assert_eq!(options.max_iterations, 100);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [model]
            image_width = 64
            image_height = 48
            use_gpu = true
            fallback_to_cpu = true

            [paths]
            dataset_path = "fruits"
            "#,
        )
        .unwrap();

        assert_eq!(config.model.image_width, 64);
        assert_eq!(config.model.image_height, 48);
        assert!(config.model.use_gpu);
        assert!(config.model.fallback_to_cpu);
        assert_eq!(config.model.epochs, 200);
        // an omitted seed means a fresh one per run
        assert_eq!(config.model.seed, None);
        assert_eq!(config.paths.dataset_path, PathBuf::from("fruits"));
        assert_eq!(config.paths.model_path, PathBuf::from("models/model.json"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fruit.toml");
        std::fs::write(&path, "[model]\nseed = 7\nepochs = 5\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.model.seed, Some(7));
        assert_eq!(config.model.epochs, 5);

        let missing = AppConfig::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(RecognitionError::Config(_))));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.model.seed, Some(42));
        assert_eq!(parsed.paths.dataset_path, config.paths.dataset_path);
    }

    #[test]
    fn test_make_absolute() {
        let mut paths = PathConfiguration::default();
        paths.make_absolute().unwrap();
        assert!(paths.dataset_path.is_absolute());
        assert!(paths.model_path.ends_with("models/model.json"));
    }
}
