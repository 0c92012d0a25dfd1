//! Error types for model startup and inference

use std::path::PathBuf;
use thiserror::Error;

/// Result type for model startup
pub type ModelResult<T> = Result<T, ModelError>;

/// Failures while bringing the model up. All of them are fatal to startup.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Configured local weights file does not exist or is not a file
    #[error("Model weights not found at {}", .0.display())]
    WeightsNotFound(PathBuf),

    /// Remote weights could not be fetched
    #[error("Failed to download model weights from {url}: {message}")]
    Download { url: String, message: String },

    #[error("I/O error while acquiring model weights: {0}")]
    Io(#[from] std::io::Error),

    /// Pre-1.6 `torch.save` pickle without the zip container
    #[error(
        "Legacy torch.save format is not supported at {}; re-save with torch>=1.6",
        .0.display()
    )]
    LegacyCheckpoint(PathBuf),

    /// Weights are corrupt or do not fit the ResNet-50 layout
    #[cfg(feature = "execute")]
    #[error("Failed to load model weights: {0}")]
    Load(#[from] candle_core::Error),

    #[error("Network produces {actual} outputs but {expected} class labels are configured")]
    OutputMismatch { expected: usize, actual: usize },

    /// Model construction panicked or was cancelled on the blocking pool
    #[error("Model loading task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Any failure during preprocessing or the forward pass of a single request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Prediction error: {message}")]
pub struct PredictionError {
    message: String,
}

impl PredictionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(feature = "execute")]
impl From<candle_core::Error> for PredictionError {
    fn from(err: candle_core::Error) -> Self {
        Self::new(err.to_string())
    }
}
