use super::classifier::Classifier;
use super::config::{ConfigError, FakeClass, ModelConfig};
use super::decoder::{self, DecodeError};
use super::preprocess::Preprocessor;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Model error: {0}")]
    Model(String),
    #[error("Unexpected model output: {0}")]
    UnexpectedOutput(String),
    #[error("Classifier returned {0} scores, need at least two")]
    TooFewScores(usize),
    #[error("Fake class index {index} is out of range for {classes} scores")]
    FakeIndexOutOfRange { index: usize, classes: usize },
    #[error("Classifier returned non-finite scores")]
    NonFiniteScores,
}

#[cfg(feature = "torch")]
impl From<tch::TchError> for InferenceError {
    fn from(err: tch::TchError) -> Self {
        InferenceError::Model(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// The full pipeline around one loaded classifier. Built once before the
/// server starts and shared read-only by every request.
pub struct Detector<C> {
    preprocessor: Preprocessor,
    classifier: C,
    fake_class: FakeClass,
}

impl<C: Classifier> Detector<C> {
    pub fn new(config: &ModelConfig, classifier: C) -> Result<Self, ConfigError> {
        Ok(Self {
            preprocessor: Preprocessor::from_config(config)?,
            classifier,
            fake_class: config.fake_class()?,
        })
    }

    pub fn fake_class(&self) -> &FakeClass {
        &self.fake_class
    }

    /// Probability that `image_data` is a deepfake.
    pub fn predict(&self, image_data: &[u8]) -> Result<f32, DetectError> {
        let image = decoder::decode(image_data)?;
        let input = self.preprocessor.apply(&image);
        let scores = self.classifier.scores(&input)?;
        Ok(self.fake_probability(&scores)?)
    }

    pub fn fake_probability(&self, scores: &[f32]) -> Result<f32, InferenceError> {
        if scores.len() < 2 {
            return Err(InferenceError::TooFewScores(scores.len()));
        }
        if self.fake_class.index >= scores.len() {
            return Err(InferenceError::FakeIndexOutOfRange {
                index: self.fake_class.index,
                classes: scores.len(),
            });
        }

        let probabilities = softmax(scores)?;
        Ok(probabilities[self.fake_class.index])
    }
}

/// Softmax over raw class scores, shifted by the max score for stability.
pub fn softmax(scores: &[f32]) -> Result<Vec<f32>, InferenceError> {
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(InferenceError::NonFiniteScores);
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    Ok(exps.into_iter().map(|e| e / sum).collect())
}
