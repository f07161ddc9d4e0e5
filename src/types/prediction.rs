//! Prediction response data structures

use serde::{Deserialize, Serialize};

/// One ranked class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLabel {
    /// Class name, or the class index when no name is known
    pub label: String,
    /// Softmax probability
    pub probability: f32,
}

/// Successful `/predict` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// Up to `top_k` classes, most probable first
    pub top: Vec<RankedLabel>,
    /// Full probability vector, one entry per model output
    pub raw: Vec<f32>,
}

impl PredictionResponse {
    /// Most probable class, if any
    pub fn best(&self) -> Option<&RankedLabel> {
        self.top.first()
    }
}

/// Failure body shared by every error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}
