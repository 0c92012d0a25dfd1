//! ResNet-50 construction and device selection.

use crate::error::{ModelError, ModelResult};
use crate::labels::CLASS_LABELS;
use candle_core::{DType, Device, Module};
use candle_nn::VarBuilder;
use std::io::Read;
use std::path::Path;

/// A loaded network mapping `[1, 3, 224, 224]` inputs to `[1, N]` logits.
pub type Network = Box<dyn Module + Send + Sync>;

/// Pick the best available device: CUDA, then Metal, then CPU.
pub fn select_device() -> Device {
    if candle_core::utils::cuda_is_available() {
        match Device::new_cuda(0) {
            Ok(device) => {
                tracing::info!("Using CUDA device 0");
                return device;
            }
            Err(e) => tracing::warn!("CUDA compiled in but not usable: {e}"),
        }
    }

    if candle_core::utils::metal_is_available() {
        match Device::new_metal(0) {
            Ok(device) => {
                tracing::info!("Using Metal device 0");
                return device;
            }
            Err(e) => tracing::warn!("Metal compiled in but not usable: {e}"),
        }
    }

    tracing::info!("Using CPU device");
    Device::Cpu
}

/// torchvision ResNet-50 with `fc` replaced by a 2048 -> `CLASS_LABELS.len()` layer.
/// Parameter names follow the torchvision state dict (`conv1`, `layer1.0.bn2`, `fc`, ...).
pub fn build_resnet50(vb: VarBuilder<'static>) -> candle_core::Result<Network> {
    let model = candle_transformers::models::resnet::resnet50(CLASS_LABELS.len(), vb)?;
    Ok(Box::new(model))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightsFormat {
    /// `torch.save(model.state_dict())` zip archive
    PyTorch,
    /// Bare pickle stream written by torch < 1.6
    LegacyPickle,
    SafeTensors,
}

impl WeightsFormat {
    /// Detect the checkpoint format from its leading bytes.
    pub fn sniff(path: &Path) -> std::io::Result<Self> {
        let mut magic = [0u8; 4];
        let mut file = std::fs::File::open(path)?;
        let read = file.read(&mut magic)?;
        Ok(Self::from_magic(&magic[..read]))
    }

    fn from_magic(magic: &[u8]) -> Self {
        if magic.starts_with(b"PK\x03\x04") {
            WeightsFormat::PyTorch
        } else if magic.first() == Some(&0x80) {
            // pickle protocol marker
            WeightsFormat::LegacyPickle
        } else {
            WeightsFormat::SafeTensors
        }
    }
}

/// Load a checkpoint into a fresh ResNet-50 on `device`.
pub fn load_resnet50(path: &Path, device: &Device) -> ModelResult<Network> {
    let format = WeightsFormat::sniff(path)?;
    tracing::info!(path = %path.display(), ?format, "Loading ResNet-50 weights");

    let vb = match format {
        WeightsFormat::PyTorch => VarBuilder::from_pth(path, DType::F32, device)?,
        WeightsFormat::LegacyPickle => {
            return Err(ModelError::LegacyCheckpoint(path.to_path_buf()));
        }
        // SAFETY: the file is not modified while mapped; every tensor is copied
        // onto `device` during construction below.
        WeightsFormat::SafeTensors => unsafe {
            VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)?
        },
    };

    Ok(build_resnet50(vb)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn sniff_detects_zip_checkpoints() {
        assert_eq!(
            WeightsFormat::from_magic(b"PK\x03\x04"),
            WeightsFormat::PyTorch
        );
        assert_eq!(
            WeightsFormat::from_magic(&[0x80, 0x02]),
            WeightsFormat::LegacyPickle
        );
        assert_eq!(
            WeightsFormat::from_magic(&[0x48, 0x01, 0, 0]),
            WeightsFormat::SafeTensors
        );
        assert_eq!(WeightsFormat::from_magic(&[]), WeightsFormat::SafeTensors);
    }

    #[test]
    fn sniff_reads_file_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"PK\x03\x04rest-of-archive").unwrap();
        assert_eq!(
            WeightsFormat::sniff(file.path()).unwrap(),
            WeightsFormat::PyTorch
        );
    }

    #[test]
    fn corrupt_checkpoint_fails_to_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"PK\x03\x04 definitely not a zip").unwrap();
        assert!(load_resnet50(file.path(), &Device::Cpu).is_err());
    }

    #[test]
    fn legacy_pickle_checkpoint_is_rejected_by_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x80, 0x02, 0x8a, 0x0a]).unwrap();

        let err = load_resnet50(file.path(), &Device::Cpu).err().unwrap();
        assert!(matches!(err, ModelError::LegacyCheckpoint(ref p) if p == file.path()));
        assert!(err.to_string().contains("re-save with torch>=1.6"));
    }

    #[test]
    fn cpu_is_selected_without_accelerator_features() {
        if !candle_core::utils::cuda_is_available() && !candle_core::utils::metal_is_available() {
            assert!(select_device().is_cpu());
        }
    }
}
