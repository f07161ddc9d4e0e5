//! Model host: readiness tracking and probability inference

use crate::config::{Device, ModelConfig};
use crate::error::PredictError;
use crate::models::loader::{LoadedModel, ModelLoader};
use anyhow::{anyhow, ensure, Context, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info};

/// Forward pass from a preprocessed image tensor to raw class logits.
///
/// Implementations must be deterministic for identical input.
pub trait Classifier: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Device the model executes on
    fn device(&self) -> Device {
        Device::Cpu
    }

    /// Run the model on a `[1, 3, H, W]` tensor and return its logits.
    fn logits(&self, input: &[f32], shape: &[usize]) -> Result<Vec<f32>>;
}

/// ONNX Runtime backed classifier
pub struct OnnxClassifier {
    name: String,
    device: Device,
    // Session::run needs exclusive access
    model: Mutex<LoadedModel>,
}

impl OnnxClassifier {
    pub fn new(model: LoadedModel) -> Self {
        Self {
            name: model.name.clone(),
            device: model.device,
            model: Mutex::new(model),
        }
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> Device {
        self.device
    }

    fn logits(&self, input: &[f32], shape: &[usize]) -> Result<Vec<f32>> {
        use ort::value::Tensor;

        let shape: Vec<i64> = shape.iter().map(|&d| d as i64).collect();
        let input_tensor =
            Tensor::from_array((shape, input.to_vec())).context("Failed to create input tensor")?;

        let mut guard = lock_session(&self.model);
        let model: &mut LoadedModel = &mut guard;

        let outputs = model
            .session
            .run(ort::inputs![&model.input_name => input_tensor])?;

        let output = outputs
            .get(&model.output_name)
            .with_context(|| format!("Model output '{}' missing", model.output_name))?;
        let (_shape, data) = output
            .try_extract_tensor::<f32>()
            .context("Model output is not an f32 tensor")?;

        Ok(data.to_vec())
    }
}

/// Lock a session, recovering it if an earlier holder panicked.
///
/// A session keeps no state across `run` calls, so a poisoned lock is still
/// safe to use.
fn lock_session<T>(session: &Mutex<T>) -> MutexGuard<'_, T> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Readiness of the model host. Set once at startup, never changed.
#[derive(Clone)]
pub enum ModelState {
    Ready {
        classifier: Arc<dyn Classifier>,
        num_classes: usize,
    },
    Unavailable {
        reason: String,
    },
}

/// Owns the model for the life of the process.
#[derive(Clone)]
pub struct ModelHost {
    state: ModelState,
    input_shape: [usize; 4],
}

impl ModelHost {
    /// Load the configured model. A failure is recorded, not returned: the
    /// host then stays unavailable for the lifetime of the process.
    pub fn load(config: &ModelConfig, input_shape: [usize; 4]) -> Self {
        info!(path = %config.path, "Loading classification model");

        match Self::try_load(config, input_shape) {
            Ok(host) => host,
            Err(e) => {
                error!(path = %config.path, error = %format!("{e:#}"), "Could not load model");
                Self::unavailable(format!("{e:#}"), input_shape)
            }
        }
    }

    fn try_load(config: &ModelConfig, input_shape: [usize; 4]) -> Result<Self> {
        let loader = ModelLoader::with_device(config.device, config.intra_threads)?;
        let model = loader.load_model(&config.path)?;
        Self::with_classifier(Arc::new(OnnxClassifier::new(model)), input_shape)
    }

    /// Wrap a classifier, probing it once with a blank tensor to learn the
    /// class count and confirm the input shape is accepted.
    pub fn with_classifier(
        classifier: Arc<dyn Classifier>,
        input_shape: [usize; 4],
    ) -> Result<Self> {
        let probe = vec![0.0f32; input_shape.iter().product()];
        let logits = classifier
            .logits(&probe, &input_shape)
            .context("Model rejected a probe input")?;
        ensure!(!logits.is_empty(), "Model produced no outputs");

        info!(
            model = %classifier.name(),
            device = %classifier.device(),
            num_classes = logits.len(),
            "Model ready"
        );

        Ok(Self {
            state: ModelState::Ready {
                classifier,
                num_classes: logits.len(),
            },
            input_shape,
        })
    }

    /// A host whose model failed to load
    pub fn unavailable(reason: impl Into<String>, input_shape: [usize; 4]) -> Self {
        Self {
            state: ModelState::Unavailable {
                reason: reason.into(),
            },
            input_shape,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ModelState::Ready { .. })
    }

    /// Output dimensionality, when ready
    pub fn num_classes(&self) -> Option<usize> {
        match &self.state {
            ModelState::Ready { num_classes, .. } => Some(*num_classes),
            ModelState::Unavailable { .. } => None,
        }
    }

    /// Why the model is unavailable, if it is
    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            ModelState::Ready { .. } => None,
            ModelState::Unavailable { reason } => Some(reason),
        }
    }

    /// Device label for status reporting
    pub fn device(&self) -> String {
        match &self.state {
            ModelState::Ready { classifier, .. } => classifier.device().to_string(),
            ModelState::Unavailable { .. } => "none".to_string(),
        }
    }

    /// Run the model and return a probability distribution over classes.
    pub fn classify(&self, tensor: &[f32]) -> Result<Vec<f32>, PredictError> {
        let (classifier, num_classes) = match &self.state {
            ModelState::Ready {
                classifier,
                num_classes,
            } => (classifier, *num_classes),
            ModelState::Unavailable { .. } => return Err(PredictError::ModelUnavailable),
        };

        let expected = self.input_shape.iter().product::<usize>();
        if tensor.len() != expected {
            return Err(anyhow!(
                "Input tensor has {} values, expected {}",
                tensor.len(),
                expected
            )
            .into());
        }

        let logits = classifier.logits(tensor, &self.input_shape)?;
        if logits.len() != num_classes {
            return Err(anyhow!(
                "Model returned {} logits, expected {}",
                logits.len(),
                num_classes
            )
            .into());
        }

        let probabilities = softmax(&logits)?;
        debug!(model = %classifier.name(), probabilities = ?probabilities, "Inference complete");
        Ok(probabilities)
    }
}

/// Numerically stable softmax. Non-finite logits are an error.
pub fn softmax(logits: &[f32]) -> Result<Vec<f32>> {
    ensure!(!logits.is_empty(), "Cannot normalize an empty logit vector");
    ensure!(
        logits.iter().all(|v| v.is_finite()),
        "Model produced non-finite logits"
    );

    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    Ok(exps.into_iter().map(|e| e / sum).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SHAPE: [usize; 4] = [1, 3, 4, 4];

    struct FixedLogits {
        logits: Vec<f32>,
        calls: AtomicUsize,
    }

    impl FixedLogits {
        fn new(logits: Vec<f32>) -> Self {
            Self {
                logits,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Classifier for FixedLogits {
        fn name(&self) -> &str {
            "fixed"
        }

        fn logits(&self, _input: &[f32], _shape: &[usize]) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.logits.clone())
        }
    }

    struct Failing;

    impl Classifier for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn logits(&self, _input: &[f32], _shape: &[usize]) -> Result<Vec<f32>> {
            Err(anyhow!("device lost"))
        }
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0, -4.0, 0.5]).unwrap();
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_large_logits() {
        let probs = softmax(&[1000.0, 1000.0]).unwrap();
        assert!((probs[0] - 0.5).abs() < 1e-6);
        assert!(softmax(&[f32::NAN, 1.0]).is_err());
        assert!(softmax(&[]).is_err());
    }

    #[test]
    fn test_ready_host_classifies() {
        let classifier = Arc::new(FixedLogits::new(vec![0.0, 1.0, 2.0, 3.0, 4.0]));
        let host = ModelHost::with_classifier(classifier.clone(), SHAPE).unwrap();

        assert!(host.is_ready());
        assert_eq!(host.num_classes(), Some(5));
        // probe call at construction
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);

        let probs = host.classify(&[0.0; 48]).unwrap();
        assert_eq!(probs.len(), 5);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unavailable_host_never_runs() {
        let host = ModelHost::unavailable("missing weights", SHAPE);
        assert!(!host.is_ready());
        assert_eq!(host.unavailable_reason(), Some("missing weights"));
        assert!(matches!(
            host.classify(&[0.0; 48]),
            Err(PredictError::ModelUnavailable)
        ));
    }

    #[test]
    fn test_failing_probe_is_rejected() {
        assert!(ModelHost::with_classifier(Arc::new(Failing), SHAPE).is_err());
    }

    #[test]
    fn test_wrong_tensor_length() {
        let host =
            ModelHost::with_classifier(Arc::new(FixedLogits::new(vec![1.0, 2.0])), SHAPE).unwrap();
        assert!(matches!(
            host.classify(&[0.0; 10]),
            Err(PredictError::Processing(_))
        ));
    }

    #[test]
    fn test_load_missing_model_is_unavailable() {
        let config = ModelConfig {
            path: "models/not_here.onnx".to_string(),
            labels_path: "labels.json".to_string(),
            device: Device::Cpu,
            intra_threads: 1,
            top_k: 5,
        };
        let host = ModelHost::load(&config, SHAPE);
        assert!(!host.is_ready());
        assert!(host.unavailable_reason().is_some());
    }

    #[test]
    fn test_session_lock_survives_panicking_holder() {
        let session = Arc::new(Mutex::new(0u32));
        let poisoner = session.clone();
        let result = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("inference panicked");
        })
        .join();
        assert!(result.is_err());
        assert!(session.is_poisoned());

        *lock_session(&session) += 1;
        assert_eq!(*lock_session(&session), 1);
    }
}
