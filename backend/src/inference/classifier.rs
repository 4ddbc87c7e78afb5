use super::model::InferenceError;
use super::preprocess::ModelInput;

/// A pretrained image classifier: model input in, one raw score per class out.
///
/// Implementations are shared across request threads without locking, so
/// `scores` must not mutate the model.
pub trait Classifier: Send + Sync + 'static {
    fn scores(&self, input: &ModelInput) -> Result<Vec<f32>, InferenceError>;
}

#[cfg(feature = "torch")]
pub use self::torch::TorchClassifier;

#[cfg(feature = "torch")]
mod torch {
    use std::path::Path;
    use tch::{CModule, Device, IValue, Kind, Tensor};

    use super::{Classifier, InferenceError, ModelInput};

    /// TorchScript classifier loaded once at startup.
    pub struct TorchClassifier {
        model: CModule,
        device: Device,
    }

    impl TorchClassifier {
        pub fn load(model_path: &Path) -> Result<Self, InferenceError> {
            let device = Device::cuda_if_available();
            let mut model = CModule::load_on_device(model_path, device)?;
            model.set_eval();
            log::info!(
                "Loaded TorchScript model {} on {:?}",
                model_path.display(),
                device
            );
            Ok(Self { model, device })
        }

        fn to_tensor(&self, input: &ModelInput) -> Result<Tensor, InferenceError> {
            let shape: Vec<i64> = input.shape().iter().map(|d| *d as i64).collect();
            let data = input
                .as_slice()
                .ok_or_else(|| InferenceError::Model("model input is not contiguous".into()))?;
            Ok(Tensor::from_slice(data)
                .view(shape.as_slice())
                .to_device(self.device))
        }
    }

    /// HuggingFace exports return `(logits,)` or `{"logits": ...}` rather
    /// than a bare tensor.
    fn logits(output: IValue) -> Result<Tensor, InferenceError> {
        match output {
            IValue::Tensor(tensor) => Ok(tensor),
            IValue::Tuple(values) | IValue::GenericList(values) => values
                .into_iter()
                .next()
                .ok_or_else(|| InferenceError::UnexpectedOutput("empty tuple".into()))
                .and_then(logits),
            IValue::GenericDict(entries) => entries
                .into_iter()
                .find(|(key, _)| matches!(key, IValue::String(s) if s == "logits"))
                .ok_or_else(|| InferenceError::UnexpectedOutput("no logits entry".into()))
                .and_then(|(_, value)| logits(value)),
            other => Err(InferenceError::UnexpectedOutput(format!("{:?}", other))),
        }
    }

    impl Classifier for TorchClassifier {
        fn scores(&self, input: &ModelInput) -> Result<Vec<f32>, InferenceError> {
            let tensor = self.to_tensor(input)?;
            let output = tch::no_grad(|| self.model.forward_is(&[IValue::Tensor(tensor)]))?;
            let logits = logits(output)?;

            let row = match logits.dim() {
                1 => logits,
                2 => logits.get(0),
                _ => {
                    return Err(InferenceError::UnexpectedOutput(format!(
                        "logits shape {:?}",
                        logits.size()
                    )));
                }
            };

            let row = row.to_device(Device::Cpu).to_kind(Kind::Float).contiguous();
            Ok(Vec::<f32>::try_from(&row)?)
        }
    }
}
