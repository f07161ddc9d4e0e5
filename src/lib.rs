//! Retina Classifier Library
//!
//! Serves a pretrained five-class retinal image classifier over HTTP:
//! upload an image, get the top-k class probabilities back as JSON.

pub mod config;
pub mod error;
pub mod labels;
pub mod metrics;
pub mod models;
pub mod preprocess;
pub mod server;
pub mod service;
pub mod types;

pub use config::AppConfig;
pub use error::PredictError;
pub use labels::LabelTable;
pub use models::inference::{Classifier, ModelHost};
pub use preprocess::ImagePreprocessor;
pub use service::PredictionService;
pub use types::{prediction::PredictionResponse, prediction::RankedLabel};
