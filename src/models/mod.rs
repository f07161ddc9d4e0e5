//! Model hosting and inference components

pub mod inference;
pub mod loader;
pub mod ranking;

pub use inference::{Classifier, ModelHost, OnnxClassifier};
pub use loader::ModelLoader;
pub use ranking::TopK;
