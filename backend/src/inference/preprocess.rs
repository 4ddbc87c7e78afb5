use image::imageops::{self, FilterType};
use ndarray::Array4;

use super::config::{ConfigError, ModelConfig};
use super::decoder::CanonicalImage;

/// `1 x 3 x H x W`, channel-first, normalized.
pub type ModelInput = Array4<f32>;

/// Resize + rescale + per-channel normalization, matching the image
/// processor the classifier was trained with.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    height: u32,
    width: u32,
    filter: FilterType,
    rescale_factor: f32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Preprocessor {
    pub fn from_config(config: &ModelConfig) -> Result<Self, ConfigError> {
        let (height, width) = config.image_size()?;
        Ok(Self {
            height,
            width,
            filter: config.image.resample.into(),
            rescale_factor: config.image.rescale_factor,
            mean: config.image.mean,
            std: config.image.std,
        })
    }

    pub fn input_shape(&self) -> [usize; 4] {
        [1, 3, self.height as usize, self.width as usize]
    }

    pub fn apply(&self, image: &CanonicalImage) -> ModelInput {
        let resized;
        let image = if image.dimensions() == (self.width, self.height) {
            image
        } else {
            resized = imageops::resize(image, self.width, self.height, self.filter);
            &resized
        };

        let mut input = Array4::<f32>::zeros(self.input_shape());
        for (x, y, pixel) in image.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel.0[c] as f32 * self.rescale_factor;
                input[[0, c, y as usize, x as usize]] = (value - self.mean[c]) / self.std[c];
            }
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn preprocessor(yaml_image: &str) -> Preprocessor {
        let yaml = format!("model_path: m.pt\nimage:\n{yaml_image}");
        Preprocessor::from_config(&ModelConfig::from_yaml_str(&yaml).unwrap()).unwrap()
    }

    #[test]
    fn output_is_channel_first_at_model_size() {
        let pre = preprocessor("  size: [32, 48]\n");
        let input = pre.apply(&CanonicalImage::from_pixel(100, 100, Rgb([1, 2, 3])));
        assert_eq!(input.shape(), &[1, 3, 32, 48]);
    }

    #[test]
    fn normalizes_each_channel() {
        let pre = preprocessor("  size: [2, 2]\n");
        let input = pre.apply(&CanonicalImage::from_pixel(2, 2, Rgb([0, 255, 51])));
        let r = input[[0, 0, 1, 1]];
        let g = input[[0, 1, 0, 0]];
        let b = input[[0, 2, 1, 0]];
        assert!((r - -1.0).abs() < 1e-6);
        assert!((g - 1.0).abs() < 1e-6);
        assert!((b - -0.6).abs() < 1e-5);
    }

    #[test]
    fn values_stay_in_normalized_range() {
        let pre = preprocessor("  size: [8, 8]\n  resample: lanczos\n");
        let image =
            CanonicalImage::from_fn(37, 19, |x, y| Rgb([(x * 7) as u8, (y * 13) as u8, 255]));
        let input = pre.apply(&image);
        assert!(input.iter().all(|v| v.abs() <= 1.0 + 1e-5));
    }

    #[test]
    fn custom_mean_and_std_are_used() {
        let pre = preprocessor(
            "  size: [1, 1]\n  mean: [0.485, 0.456, 0.406]\n  std: [0.229, 0.224, 0.225]\n",
        );
        let input = pre.apply(&CanonicalImage::from_pixel(1, 1, Rgb([255, 255, 255])));
        let expected = (1.0 - 0.485) / 0.229;
        assert!((input[[0, 0, 0, 0]] - expected).abs() < 1e-5);
    }
}
