//! Paddy leaf disease classification backed by a fine-tuned ResNet-50.
//!
//! The crate owns the whole model side of the service: the class label set,
//! the fixed preprocessing pipeline, weight acquisition and the forward pass.
//! Model execution lives behind the `execute` feature; without it
//! [`initialize`] reports the backend as unavailable instead of failing.

pub mod config;
pub mod error;
pub mod labels;
#[cfg(feature = "execute")]
pub mod network;
pub mod preprocess;
pub mod service;
pub mod weights;

pub use config::ModelConfig;
pub use error::{ModelError, ModelResult, PredictionError};
pub use labels::CLASS_LABELS;
#[cfg(feature = "execute")]
pub use service::ModelService;
pub use service::{BACKEND, Capability, ClassScores, ImageClassifier, Prediction, initialize};
pub use weights::WeightsSource;

pub use image;
