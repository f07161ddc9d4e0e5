//! Service status report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `/health` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok" when the model is loaded, "degraded" otherwise
    pub status: String,
    pub model_loaded: bool,
    /// Number of model outputs, when loaded
    pub num_classes: Option<usize>,
    /// Entries in the label table (0 when absent)
    pub num_labels: usize,
    pub device: String,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    /// `/predict` requests handled, failures included
    pub requests_total: u64,
}
