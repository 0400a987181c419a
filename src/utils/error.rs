//! Error Handling Module
//!
//! Defines the error type shared by the dataset pipeline, the training
//! orchestrator and the prediction aggregator.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for fruit recognition operations
#[derive(Error, Debug)]
pub enum RecognitionError {
    /// Invalid configuration (fractions, dimensions, unknown architecture...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A directory the operation needs does not exist
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// A file the operation needs does not exist
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Image to predict does not exist
    #[error("Image not found: {0}")]
    ImageNotFound(PathBuf),

    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// The inferred image root does not contain the class directories
    #[error("Image root resolution failed: {0}")]
    PathResolution(String),

    /// Fitting the model failed
    #[error("Training failed: {message}")]
    TrainingFailed {
        message: String,
        #[source]
        source: Option<Box<RecognitionError>>,
    },

    /// Scoring a single image failed
    #[error("Prediction failed for '{0}': {1}")]
    PredictionFailed(PathBuf, String),

    /// Device/hardware error
    #[error("Device error: {0}")]
    Device(String),

    /// A fit was cancelled or ran past its deadline
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RecognitionError {
    /// Wrap a fit failure, keeping the underlying error as the source
    pub fn training(message: impl Into<String>, source: RecognitionError) -> Self {
        RecognitionError::TrainingFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<serde_json::Error> for RecognitionError {
    fn from(err: serde_json::Error) -> Self {
        RecognitionError::Serialization(err.to_string())
    }
}

/// Convenience Result type for fruit recognition operations
pub type Result<T> = std::result::Result<T, RecognitionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = RecognitionError::Dataset("test error".to_string());
        assert_eq!(format!("{}", err), "Dataset error: test error");
    }

    #[test]
    fn test_image_not_found_mentions_path() {
        let err = RecognitionError::ImageNotFound(PathBuf::from("/path/to/apple.jpg"));
        assert!(err.to_string().contains("apple.jpg"));
    }

    #[test]
    fn test_training_failure_keeps_source() {
        let err = RecognitionError::training(
            "GPU training failed and CPU fallback is disabled",
            RecognitionError::Device("no GPU".to_string()),
        );
        assert!(err.to_string().contains("CPU fallback is disabled"));
        let source = err.source().expect("source should be kept");
        assert_eq!(source.to_string(), "Device error: no GPU");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RecognitionError = io_err.into();
        assert!(matches!(err, RecognitionError::Io(_)));
    }
}
