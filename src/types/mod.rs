//! Type definitions for the classification service

pub mod health;
pub mod prediction;

pub use health::HealthResponse;
pub use prediction::{ErrorBody, PredictionResponse, RankedLabel};
