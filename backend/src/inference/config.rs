use image::imageops::FilterType;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read model config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid model config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Image size must be two positive values, got {0:?}")]
    InvalidSize(Vec<u32>),
    #[error("Normalization std must be non-zero, got {0:?}")]
    ZeroStd([f32; 3]),
    #[error("Classifier needs at least two labels, got {0}")]
    TooFewLabels(usize),
    #[error("Fake class index {index} is out of range for {classes} labels")]
    FakeIndexOutOfRange { index: usize, classes: usize },
    #[error("Fake label {0:?} is not one of the configured labels")]
    UnknownFakeLabel(String),
    #[error("fake_label requires labels to be configured")]
    FakeLabelWithoutLabels,
    #[error("fake_label {label:?} resolves to index {resolved}, but fake_class_index is {index}")]
    ConflictingFakeClass {
        label: String,
        resolved: usize,
        index: usize,
    },
}

/// Model settings, read once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub fake_class_index: Option<usize>,
    #[serde(default)]
    pub fake_label: Option<String>,
    #[serde(default)]
    pub image: ImageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// `[height, width]`
    pub size: Vec<u32>,
    pub resample: Resample,
    pub rescale_factor: f32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            size: vec![224, 224],
            resample: Resample::Bilinear,
            rescale_factor: 1.0 / 255.0,
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resample {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos,
}

impl From<Resample> for FilterType {
    fn from(resample: Resample) -> Self {
        match resample {
            Resample::Nearest => FilterType::Nearest,
            Resample::Bilinear => FilterType::Triangle,
            Resample::Bicubic => FilterType::CatmullRom,
            Resample::Lanczos => FilterType::Lanczos3,
        }
    }
}

/// The output position the service reports as "deepfake".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeClass {
    pub index: usize,
    pub label: Option<String>,
}

/// Class index used when neither `fake_class_index` nor `fake_label` is set.
pub const DEFAULT_FAKE_CLASS_INDEX: usize = 1;

impl ModelConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&config_str)
    }

    pub fn from_yaml_str(config_str: &str) -> Result<Self, ConfigError> {
        let config: ModelConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.image_size()?;
        if self.image.std.iter().any(|s| *s == 0.0) {
            return Err(ConfigError::ZeroStd(self.image.std));
        }
        self.fake_class()?;
        Ok(())
    }

    /// `(height, width)` of the model input.
    pub fn image_size(&self) -> Result<(u32, u32), ConfigError> {
        match self.image.size.as_slice() {
            [h, w] if *h > 0 && *w > 0 => Ok((*h, *w)),
            _ => Err(ConfigError::InvalidSize(self.image.size.clone())),
        }
    }

    /// Resolves the fake class from `fake_label` / `fake_class_index`,
    /// checking it against `labels` when those are known.
    pub fn fake_class(&self) -> Result<FakeClass, ConfigError> {
        if !self.labels.is_empty() && self.labels.len() < 2 {
            return Err(ConfigError::TooFewLabels(self.labels.len()));
        }

        let index = match (&self.fake_label, self.fake_class_index) {
            (Some(label), explicit) => {
                if self.labels.is_empty() {
                    return Err(ConfigError::FakeLabelWithoutLabels);
                }
                let resolved = self
                    .labels
                    .iter()
                    .position(|l| l == label)
                    .ok_or_else(|| ConfigError::UnknownFakeLabel(label.clone()))?;
                if let Some(index) = explicit.filter(|i| *i != resolved) {
                    return Err(ConfigError::ConflictingFakeClass {
                        label: label.clone(),
                        resolved,
                        index,
                    });
                }
                resolved
            }
            (None, Some(index)) => index,
            (None, None) => DEFAULT_FAKE_CLASS_INDEX,
        };

        if !self.labels.is_empty() && index >= self.labels.len() {
            return Err(ConfigError::FakeIndexOutOfRange {
                index,
                classes: self.labels.len(),
            });
        }

        Ok(FakeClass {
            index,
            label: self.labels.get(index).cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "model_path: models/detector.pt\n";

    #[test]
    fn defaults_match_vit_processor() {
        let config = ModelConfig::from_yaml_str(BASE).unwrap();
        assert_eq!(config.image_size().unwrap(), (224, 224));
        assert_eq!(config.image.resample, Resample::Bilinear);
        assert_eq!(config.image.mean, [0.5, 0.5, 0.5]);
        assert_eq!(
            config.fake_class().unwrap(),
            FakeClass {
                index: DEFAULT_FAKE_CLASS_INDEX,
                label: None
            }
        );
    }

    #[test]
    fn repository_config_parses() {
        let yaml = include_str!("../../../config/model.yaml");
        let config = ModelConfig::from_yaml_str(yaml).unwrap();
        let fake = config.fake_class().unwrap();
        assert_eq!(fake.index, 1);
        assert_eq!(fake.label.as_deref(), Some("fake"));
    }

    #[test]
    fn fake_label_resolves_to_position() {
        let yaml = format!("{BASE}labels: [Fake, Real]\nfake_label: Fake\n");
        let config = ModelConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.fake_class().unwrap().index, 0);
    }

    #[test]
    fn fake_index_outside_labels_is_rejected() {
        let yaml = format!("{BASE}labels: [real, fake]\nfake_class_index: 2\n");
        assert!(matches!(
            ModelConfig::from_yaml_str(&yaml),
            Err(ConfigError::FakeIndexOutOfRange { index: 2, classes: 2 })
        ));
    }

    #[test]
    fn conflicting_label_and_index_are_rejected() {
        let yaml = format!(
            "{BASE}labels: [real, fake]\nfake_label: fake\nfake_class_index: 0\n"
        );
        assert!(matches!(
            ModelConfig::from_yaml_str(&yaml),
            Err(ConfigError::ConflictingFakeClass { resolved: 1, index: 0, .. })
        ));
    }

    #[test]
    fn unknown_fake_label_is_rejected() {
        let yaml = format!("{BASE}labels: [real, fake]\nfake_label: synthetic\n");
        assert!(matches!(
            ModelConfig::from_yaml_str(&yaml),
            Err(ConfigError::UnknownFakeLabel(_))
        ));
    }

    #[test]
    fn single_label_is_rejected() {
        let yaml = format!("{BASE}labels: [fake]\nfake_class_index: 0\n");
        assert!(matches!(
            ModelConfig::from_yaml_str(&yaml),
            Err(ConfigError::TooFewLabels(1))
        ));
    }

    #[test]
    fn bad_image_settings_are_rejected() {
        let yaml = format!("{BASE}image:\n  size: [224]\n");
        assert!(matches!(
            ModelConfig::from_yaml_str(&yaml),
            Err(ConfigError::InvalidSize(_))
        ));

        let yaml = format!("{BASE}image:\n  std: [0.5, 0.0, 0.5]\n");
        assert!(matches!(
            ModelConfig::from_yaml_str(&yaml),
            Err(ConfigError::ZeroStd(_))
        ));
    }
}
