use image::{ImageReader, RgbImage};
use std::io::Cursor;

/// Decoded upload with a fixed 3-channel RGB layout.
pub type CanonicalImage = RgbImage;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Uploaded file is empty")]
    Empty,
    #[error("Uploaded file is not a recognized image format")]
    UnknownFormat,
    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),
}

/// Decodes raw upload bytes, converting any color type (gray, alpha,
/// 16-bit, ...) to 8-bit RGB.
pub fn decode(image_data: &[u8]) -> Result<CanonicalImage, DecodeError> {
    if image_data.is_empty() {
        return Err(DecodeError::Empty);
    }

    let reader = ImageReader::new(Cursor::new(image_data)).with_guessed_format()?;
    if reader.format().is_none() {
        return Err(DecodeError::UnknownFormat);
    }

    let image = reader.decode()?;
    if image.width() == 0 || image.height() == 0 {
        return Err(DecodeError::EmptyImage {
            width: image.width(),
            height: image.height(),
        });
    }
    log::debug!(
        "Decoded {}x{} image with color type {:?}",
        image.width(),
        image.height(),
        image.color()
    );
    Ok(image.to_rgb8())
}
