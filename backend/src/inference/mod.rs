pub mod classifier;
pub mod config;
pub mod decoder;
pub mod model;
pub mod preprocess;

pub use classifier::Classifier;
pub use config::ModelConfig;
pub use model::{DetectError, Detector, InferenceError};
