//! Transport image decoding.
//!
//! Captured images arrive as base64 text, usually as a browser data URL
//! (`data:image/jpeg;base64,...`). Everything is normalized to 8-bit RGB.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("image payload is empty")]
    Empty,
    #[error("image payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload does not decode to an image: {0}")]
    Image(#[from] image::ImageError),
}

/// An in-memory 8-bit RGB raster owned by a single pipeline invocation.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    raster: RgbImage,
}

impl DecodedImage {
    /// Number of color channels. Always 3.
    pub const CHANNELS: u8 = 3;

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn channels(&self) -> u8 {
        Self::CHANNELS
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.raster
    }

    /// Encode as PNG at `path`. Lossless, so staged bytes match the raster.
    pub fn write_png(&self, path: &Path) -> Result<(), image::ImageError> {
        self.raster.save_with_format(path, ImageFormat::Png)
    }
}

impl From<DynamicImage> for DecodedImage {
    fn from(image: DynamicImage) -> Self {
        Self { raster: image.to_rgb8() }
    }
}

/// Decode a transport-encoded image.
///
/// A leading media-type prefix (anything before the first comma) is
/// discarded. Grayscale and alpha inputs are converted to RGB.
pub fn decode(encoded: &str) -> Result<DecodedImage, CodecError> {
    let payload = match encoded.split_once(',') {
        Some((_prefix, data)) => data,
        None => encoded,
    };

    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(CodecError::Empty);
    }

    let bytes = STANDARD.decode(compact.as_bytes())?;
    let image = image::load_from_memory(&bytes)?;

    tracing::debug!(
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "decoded captured image"
    );

    Ok(image.into())
}

/// Encode raw image file bytes as a data URL (`data:<mime>;base64,<payload>`).
pub fn encode_data_url(bytes: &[u8], format: ImageFormat) -> String {
    format!("data:{};base64,{}", format.to_mime_type(), STANDARD.encode(bytes))
}
