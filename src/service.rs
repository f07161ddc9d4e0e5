//! Prediction service: decode, preprocess, infer, rank.

use crate::config::AppConfig;
use crate::error::PredictError;
use crate::labels::LabelTable;
use crate::models::{ModelHost, TopK};
use crate::preprocess::ImagePreprocessor;
use crate::types::prediction::PredictionResponse;

/// Everything a request needs, built once at startup and shared read-only.
pub struct PredictionService {
    host: ModelHost,
    labels: LabelTable,
    preprocessor: ImagePreprocessor,
    ranking: TopK,
}

impl PredictionService {
    pub fn new(host: ModelHost, labels: LabelTable, top_k: usize) -> Self {
        if let Some(num_classes) = host.num_classes() {
            labels.check_coverage(num_classes);
        }

        Self {
            host,
            labels,
            preprocessor: ImagePreprocessor::new(),
            ranking: TopK::new(top_k),
        }
    }

    /// Load the model and labels named in the configuration.
    ///
    /// Always succeeds; a model that fails to load leaves the service in the
    /// unavailable state.
    pub fn from_config(config: &AppConfig) -> Self {
        let preprocessor = ImagePreprocessor::new();
        let host = ModelHost::load(&config.model, preprocessor.input_shape());
        let labels = LabelTable::load(&config.model.labels_path);
        Self::new(host, labels, config.model.top_k)
    }

    pub fn is_ready(&self) -> bool {
        self.host.is_ready()
    }

    pub fn host(&self) -> &ModelHost {
        &self.host
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Classify one uploaded image.
    pub fn predict(&self, image_bytes: &[u8]) -> Result<PredictionResponse, PredictError> {
        if !self.host.is_ready() {
            return Err(PredictError::ModelUnavailable);
        }

        let tensor = self.preprocessor.preprocess(image_bytes)?;
        let raw = self.host.classify(&tensor)?;
        let top = self.ranking.rank(&raw, &self.labels);

        Ok(PredictionResponse { top, raw })
    }
}
