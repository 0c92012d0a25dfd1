use crate::weights::WeightsSource;
use std::path::PathBuf;

/// Default location of the fine-tuned checkpoint, relative to the working directory.
pub const DEFAULT_MODEL_PATH: &str = "models/best_ResNet-50.pth";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelConfig {
    pub source: WeightsSource,
}

impl ModelConfig {
    pub fn new(source: WeightsSource) -> Self {
        Self { source }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            source: WeightsSource::Local(PathBuf::from(DEFAULT_MODEL_PATH)),
        }
    }
}
