//! ONNX model loader

use crate::config::Device;
use anyhow::{bail, Context, Result};
use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::info;

/// Loaded ONNX model with metadata
pub struct LoadedModel {
    /// Model name (file stem)
    pub name: String,
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the image tensor
    pub input_name: String,
    /// Output name for class logits
    pub output_name: String,
    /// Device the session was placed on
    pub device: Device,
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Requested execution device
    device: Device,
    /// Number of threads for ONNX inference
    intra_threads: usize,
}

impl ModelLoader {
    /// Create a loader for the given device and thread count
    pub fn with_device(device: Device, intra_threads: usize) -> Result<Self> {
        // Initialize ONNX Runtime
        ort::init().commit()?;
        info!(device = %device, intra_threads = intra_threads, "ONNX Runtime initialized");
        Ok(Self {
            device,
            intra_threads,
        })
    }

    /// Load a single ONNX model from file
    pub fn load_model<P: AsRef<Path>>(&self, path: P) -> Result<LoadedModel> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("Model file not found: {}", path.display());
        }

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let device = resolve_device(self.device)?;

        info!(
            model = %name,
            path = %path.display(),
            device = %device,
            threads = self.intra_threads,
            "Loading ONNX model"
        );

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.intra_threads)?
            .with_execution_providers(execution_providers(device)?)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .context("Model declares no inputs")?;

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("logits") || o.name.contains("output"))
            .or_else(|| session.outputs.first())
            .map(|o| o.name.clone())
            .context("Model declares no outputs")?;

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            name,
            session,
            input_name,
            output_name,
            device,
        })
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            intra_threads: 1,
        }
    }
}

/// Pick the concrete device for a requested one.
///
/// `Auto` prefers CUDA when the provider is usable; an explicit `Cuda`
/// request fails instead of silently running on the CPU.
pub fn resolve_device(requested: Device) -> Result<Device> {
    match requested {
        Device::Cpu => Ok(Device::Cpu),
        Device::Auto if cuda_available() => Ok(Device::Cuda),
        Device::Auto => Ok(Device::Cpu),
        Device::Cuda if cuda_available() => Ok(Device::Cuda),
        Device::Cuda if cfg!(feature = "cuda") => {
            bail!("CUDA execution provider is not available on this host")
        }
        Device::Cuda => bail!("CUDA requested but the service was built without the `cuda` feature"),
    }
}

#[cfg(feature = "cuda")]
fn cuda_available() -> bool {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
    CUDAExecutionProvider::default()
        .is_available()
        .unwrap_or(false)
}

#[cfg(not(feature = "cuda"))]
fn cuda_available() -> bool {
    false
}

fn execution_providers(device: Device) -> Result<Vec<ExecutionProviderDispatch>> {
    let mut providers = Vec::new();
    match device {
        #[cfg(feature = "cuda")]
        Device::Cuda => {
            providers.push(
                ort::execution_providers::CUDAExecutionProvider::default()
                    .build()
                    .error_on_failure(),
            );
        }
        #[cfg(not(feature = "cuda"))]
        Device::Cuda => bail!("CUDA execution provider requested but cuda feature is not enabled"),
        Device::Cpu | Device::Auto => {
            providers.push(CPUExecutionProvider::default().build());
        }
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_resolves_to_cpu() {
        assert_eq!(resolve_device(Device::Cpu).unwrap(), Device::Cpu);
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_auto_without_cuda_feature() {
        assert_eq!(resolve_device(Device::Auto).unwrap(), Device::Cpu);
        assert!(resolve_device(Device::Cuda).is_err());
    }

    #[test]
    fn test_missing_model_file() {
        let loader = ModelLoader::default();
        let err = loader
            .load_model("models/does_not_exist.onnx")
            .err()
            .unwrap();
        assert!(err.to_string().contains("not found"));
    }
}
