//! Request-level error kinds

use crate::types::prediction::ErrorBody;

/// Message returned while the model host is unavailable
pub const MODEL_NOT_LOADED: &str = "Model not loaded.";

/// Message returned for any per-request processing failure
pub const PREDICTION_FAILED: &str = "Prediction failed";

/// Why a prediction request did not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    /// The model failed to load at startup
    #[error("Model not loaded.")]
    ModelUnavailable,

    /// Reading, decoding, preprocessing, inference or formatting failed
    #[error("Prediction failed: {0:#}")]
    Processing(#[from] anyhow::Error),
}

impl PredictError {
    /// Label used in metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::ModelUnavailable => "model_unavailable",
            PredictError::Processing(_) => "processing",
        }
    }

    /// Response payload. The cause chain is only included when
    /// `expose_details` is set.
    pub fn to_body(&self, expose_details: bool) -> ErrorBody {
        match self {
            PredictError::ModelUnavailable => ErrorBody {
                error: MODEL_NOT_LOADED.to_string(),
                details: None,
                traceback: None,
            },
            PredictError::Processing(e) => ErrorBody {
                error: PREDICTION_FAILED.to_string(),
                details: Some(format!("{e:#}")),
                traceback: expose_details.then(|| format!("{e:?}")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn test_unavailable_body() {
        let body = PredictError::ModelUnavailable.to_body(true);
        assert_eq!(body.error, "Model not loaded.");
        assert!(body.details.is_none());
        assert!(body.traceback.is_none());
    }

    #[test]
    fn test_processing_body_includes_cause_chain() {
        let err: anyhow::Result<()> = Err(anyhow!("unexpected end of file"));
        let err = PredictError::from(err.context("Failed to decode uploaded image").unwrap_err());

        let body = err.to_body(false);
        assert_eq!(body.error, "Prediction failed");
        assert_eq!(
            body.details.as_deref(),
            Some("Failed to decode uploaded image: unexpected end of file")
        );
        assert!(body.traceback.is_none());

        let body = err.to_body(true);
        assert!(body.traceback.unwrap().contains("unexpected end of file"));
        assert_eq!(err.kind(), "processing");
    }
}
