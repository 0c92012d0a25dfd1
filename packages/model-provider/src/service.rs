use crate::config::ModelConfig;
use crate::error::{ModelResult, PredictionError};
use crate::labels::{CLASS_LABELS, label_for};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name of the library that executes the network.
pub const BACKEND: &str = "candle";

/// Top-1 result, serialised as `{"prediction": .., "confidence": ..}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Prediction {
    pub prediction: String,
    pub confidence: f32,
}

/// Softmax probabilities for every class, in `CLASS_LABELS` order.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassScores {
    probabilities: Vec<f32>,
}

impl ClassScores {
    pub fn from_probabilities(probabilities: Vec<f32>) -> Result<Self, PredictionError> {
        if probabilities.len() != CLASS_LABELS.len() {
            return Err(PredictionError::new(format!(
                "expected {} class scores, got {}",
                CLASS_LABELS.len(),
                probabilities.len()
            )));
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(PredictionError::new("network produced non-finite scores"));
        }
        Ok(Self { probabilities })
    }

    pub fn probabilities(&self) -> &[f32] {
        &self.probabilities
    }

    /// Highest-probability class. Ties resolve to the lowest index.
    pub fn top(&self) -> Prediction {
        let (index, confidence) = self.probabilities.iter().copied().enumerate().fold(
            (0, f32::MIN),
            |best, (i, p)| if p > best.1 { (i, p) } else { best },
        );
        Prediction {
            prediction: label_for(index).unwrap_or(CLASS_LABELS[0]).to_string(),
            confidence,
        }
    }
}

/// Seam between the HTTP front and whatever runs the model.
pub trait ImageClassifier: Send + Sync {
    fn predict(&self, image: &RgbImage) -> Result<Prediction, PredictionError>;
}

/// Outcome of model initialisation, decided once at startup.
#[derive(Clone)]
pub enum Capability {
    Available(Arc<dyn ImageClassifier>),
    /// The backend is not part of this build; the reason is for logs only.
    Unavailable(String),
}

impl Capability {
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    pub fn classifier(&self) -> Option<&Arc<dyn ImageClassifier>> {
        match self {
            Capability::Available(classifier) => Some(classifier),
            Capability::Unavailable(_) => None,
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Available(_) => f.write_str("Available"),
            Capability::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

/// Load the model described by `config`. Weight problems are returned as errors
/// and must abort startup; a build without the backend yields `Unavailable`.
#[cfg(feature = "execute")]
pub async fn initialize(config: &ModelConfig) -> ModelResult<Capability> {
    let service = ModelService::load(config).await?;
    Ok(Capability::Available(Arc::new(service)))
}

#[cfg(not(feature = "execute"))]
pub async fn initialize(config: &ModelConfig) -> ModelResult<Capability> {
    tracing::warn!(source = %config.source, "{BACKEND} not available, model will not be loaded");
    Ok(Capability::Unavailable(format!(
        "{BACKEND} support was not compiled in; rebuild with --features execute"
    )))
}

#[cfg(feature = "execute")]
pub use execute::ModelService;

#[cfg(feature = "execute")]
mod execute {
    use super::*;
    use crate::error::ModelError;
    use crate::network::{Network, load_resnet50, select_device};
    use crate::preprocess::{self, CROP};
    use crate::weights;
    use candle_core::{D, DType, Device, Module, Tensor};

    /// The loaded network plus its device. Immutable after construction and
    /// shared across requests behind an `Arc`.
    pub struct ModelService {
        network: Network,
        device: Device,
    }

    impl ModelService {
        /// Acquire weights, build ResNet-50 and verify its output layer. Any
        /// temporary download is removed before this returns.
        pub async fn load(config: &ModelConfig) -> ModelResult<Self> {
            tracing::info!(source = %config.source, kind = config.source.kind(), "Loading model");
            let weights = weights::acquire(&config.source).await?;

            tokio::task::spawn_blocking(move || {
                let device = select_device();
                let network = load_resnet50(weights.path(), &device)?;
                drop(weights);
                Self::from_module(network, device)
            })
            .await?
        }

        /// Wrap an already-built network. Runs one forward pass on a zero input
        /// to check the output width matches `CLASS_LABELS`.
        pub fn from_module(network: Network, device: Device) -> ModelResult<Self> {
            let probe = Tensor::zeros((1, 3, CROP as usize, CROP as usize), DType::F32, &device)?;
            let dims = network.forward(&probe)?.dims().to_vec();
            let expected = CLASS_LABELS.len();

            if dims.len() != 2 || dims[0] != 1 || dims[1] != expected {
                return Err(ModelError::OutputMismatch {
                    expected,
                    actual: dims.last().copied().unwrap_or(0),
                });
            }

            tracing::info!(classes = expected, device = ?device, "Model ready");
            Ok(Self { network, device })
        }

        pub fn device(&self) -> &Device {
            &self.device
        }

        /// Full softmax distribution over `CLASS_LABELS`.
        pub fn classify(&self, image: &RgbImage) -> Result<ClassScores, PredictionError> {
            if image.width() == 0 || image.height() == 0 {
                return Err(PredictionError::new("image is empty"));
            }

            let input = preprocess::resize_and_crop(image);
            let data = preprocess::to_chw(&input);
            let tensor = Tensor::from_vec(data, (1, 3, CROP as usize, CROP as usize), &self.device)?;

            let logits = self.network.forward(&tensor)?;
            let probabilities = candle_nn::ops::softmax(&logits, D::Minus1)?
                .squeeze(0)?
                .to_dtype(DType::F32)?
                .to_vec1::<f32>()?;

            ClassScores::from_probabilities(probabilities)
        }
    }

    impl ImageClassifier for ModelService {
        fn predict(&self, image: &RgbImage) -> Result<Prediction, PredictionError> {
            let prediction = self.classify(image)?.top();
            tracing::debug!(
                label = %prediction.prediction,
                confidence = prediction.confidence,
                "Classified image"
            );
            Ok(prediction)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_picks_highest_probability() {
        let scores =
            ClassScores::from_probabilities(vec![0.05, 0.05, 0.1, 0.6, 0.1, 0.05, 0.05]).unwrap();
        let top = scores.top();
        assert_eq!(top.prediction, "Blast");
        assert!((top.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn top_breaks_ties_towards_lowest_index() {
        let p = 1.0 / 7.0;
        let scores = ClassScores::from_probabilities(vec![p; 7]).unwrap();
        assert_eq!(scores.top().prediction, "BacterialBlight");
    }

    #[test]
    fn scores_reject_wrong_width() {
        let err = ClassScores::from_probabilities(vec![0.5, 0.5]).unwrap_err();
        assert!(err.message().contains("expected 7"));
    }

    #[test]
    fn scores_reject_nan() {
        let mut probabilities = vec![0.0; 7];
        probabilities[2] = f32::NAN;
        assert!(ClassScores::from_probabilities(probabilities).is_err());
    }

    #[test]
    fn prediction_wire_format() {
        let json = serde_json::to_value(Prediction {
            prediction: "Normal".to_string(),
            confidence: 0.5,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"prediction": "Normal", "confidence": 0.5}));
    }

    #[test]
    fn unavailable_capability_has_no_classifier() {
        let capability = Capability::Unavailable("not compiled".to_string());
        assert!(!capability.is_available());
        assert!(capability.classifier().is_none());
    }

    #[cfg(feature = "execute")]
    mod model_service {
        use super::super::*;
        use crate::error::ModelError;
        use crate::network::{Network, build_resnet50};
        use candle_core::{DType, Device, Tensor};
        use candle_nn::{Func, VarBuilder};
        use image::Rgb;

        fn fixed_logits(logits: [f32; 7]) -> Network {
            Box::new(Func::new(move |xs: &Tensor| {
                Tensor::new(&[logits], xs.device())
            }))
        }

        /// Logits are the first seven red-channel values, so output depends on the image.
        fn pixel_logits() -> Network {
            Box::new(Func::new(|xs: &Tensor| xs.flatten_from(1)?.narrow(1, 0, 7)))
        }

        fn gradient(width: u32, height: u32) -> RgbImage {
            RgbImage::from_fn(width, height, |x, y| {
                Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, ((x + y) % 256) as u8])
            })
        }

        #[test]
        fn probabilities_sum_to_one() {
            let service = ModelService::from_module(
                fixed_logits([1.0, -2.0, 0.5, 3.0, 0.0, 0.25, -1.0]),
                Device::Cpu,
            )
            .unwrap();

            let scores = service.classify(&gradient(300, 200)).unwrap();
            let sum: f32 = scores.probabilities().iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
            assert!(scores.probabilities().iter().all(|p| (0.0..=1.0).contains(p)));
        }

        #[test]
        fn predict_returns_argmax_label() {
            let service = ModelService::from_module(
                fixed_logits([0.0, 0.0, 0.0, 0.0, 0.0, 5.0, 0.0]),
                Device::Cpu,
            )
            .unwrap();

            let prediction = service.predict(&gradient(64, 64)).unwrap();
            assert_eq!(prediction.prediction, "Normal");
            assert!(prediction.confidence > 0.9 && prediction.confidence <= 1.0);
        }

        #[test]
        fn predict_is_deterministic() {
            let service = ModelService::from_module(pixel_logits(), Device::Cpu).unwrap();
            let image = gradient(500, 375);

            let first = service.classify(&image).unwrap();
            let second = service.classify(&image).unwrap();
            assert_eq!(first, second);
            assert!(CLASS_LABELS.contains(&service.predict(&image).unwrap().prediction.as_str()));
        }

        #[test]
        fn empty_image_is_a_prediction_error() {
            let service = ModelService::from_module(pixel_logits(), Device::Cpu).unwrap();
            let err = service.predict(&RgbImage::new(0, 0)).unwrap_err();
            assert_eq!(err.to_string(), "Prediction error: image is empty");
        }

        #[test]
        fn forward_failure_is_a_prediction_error() {
            let calls = std::sync::atomic::AtomicUsize::new(0);
            // first call is the startup probe
            let network: Network = Box::new(Func::new(move |xs: &Tensor| {
                if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                    Tensor::zeros((1, 7), DType::F32, xs.device())
                } else {
                    xs.reshape((5, 5))
                }
            }));
            let service = ModelService::from_module(network, Device::Cpu).unwrap();

            let err = service.predict(&gradient(32, 32)).unwrap_err();
            assert!(err.to_string().starts_with("Prediction error: "));
        }

        #[test]
        fn wrong_output_width_is_rejected_at_startup() {
            let network: Network = Box::new(Func::new(|xs: &Tensor| {
                Tensor::zeros((1, 1000), DType::F32, xs.device())
            }));
            match ModelService::from_module(network, Device::Cpu) {
                Err(ModelError::OutputMismatch { expected, actual }) => {
                    assert_eq!(expected, 7);
                    assert_eq!(actual, 1000);
                }
                Err(other) => panic!("unexpected error: {other}"),
                Ok(_) => panic!("mismatched network accepted"),
            }
        }

        #[test]
        fn resnet50_builds_with_seven_outputs() {
            let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
            assert!(build_resnet50(vb).is_ok());
        }

        #[test]
        #[ignore = "runs a full ResNet-50 forward pass on CPU"]
        fn resnet50_end_to_end_with_zero_weights() {
            let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
            let service =
                ModelService::from_module(build_resnet50(vb).unwrap(), Device::Cpu).unwrap();

            let scores = service.classify(&gradient(320, 240)).unwrap();
            for p in scores.probabilities() {
                assert!((p - 1.0 / 7.0).abs() < 1e-5);
            }
            assert_eq!(scores.top().prediction, "BacterialBlight");
        }

        #[tokio::test]
        async fn load_fails_for_missing_weights() {
            let dir = tempfile::tempdir().unwrap();
            let config = ModelConfig::new(crate::WeightsSource::Local(dir.path().join("x.pth")));
            assert!(matches!(
                ModelService::load(&config).await,
                Err(ModelError::WeightsNotFound(_))
            ));
            assert!(matches!(
                initialize(&config).await,
                Err(ModelError::WeightsNotFound(_))
            ));
        }
    }
}
