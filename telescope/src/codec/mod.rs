//! Image codec and resampling capabilities.
//!
//! The engine never touches pixel formats directly. It calls through
//! [`ImageCodec`] to turn bytes into images and back, and through
//! [`Resampler`] to produce resized variants. The production implementations
//! use the `image` crate.

mod policy;
mod resample;

pub use policy::{EncodeFormat, FormatPolicy, DEFAULT_JPEG_QUALITY};
pub use resample::{ImageResampler, Resampler};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

/// A decoded image as held by the memory tier and returned to callers.
pub type CachedImage = Arc<DynamicImage>;

/// Codec failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Bytes are not a supported image.
    #[error("decode failed: {0}")]
    Decode(String),
    /// The image could not be written in the requested format.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Converts between encoded bytes and decoded images.
pub trait ImageCodec: Send + Sync {
    /// Decode raw bytes into an image.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError>;

    /// Encode an image. `quality` is in `0.0..=1.0` and only affects lossy formats.
    fn encode(
        &self,
        image: &DynamicImage,
        format: EncodeFormat,
        quality: f32,
    ) -> Result<Vec<u8>, CodecError>;

    /// Whether any pixel of the image is not fully opaque.
    fn has_transparency(&self, image: &DynamicImage) -> bool;
}

/// [`ImageCodec`] backed by the `image` crate (PNG and JPEG).
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateCodec;

impl ImageCrateCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self
    }
}

/// Map `0.0..=1.0` onto the JPEG encoder's `1..=100` scale.
fn jpeg_quality(quality: f32) -> u8 {
    (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
}

impl ImageCodec for ImageCrateCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError> {
        image::load_from_memory(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: EncodeFormat,
        quality: f32,
    ) -> Result<Vec<u8>, CodecError> {
        let mut bytes = Vec::new();
        match format {
            EncodeFormat::Png => {
                image
                    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
            }
            EncodeFormat::Jpeg => {
                // JPEG carries no alpha channel
                let rgb = image.to_rgb8();
                JpegEncoder::new_with_quality(&mut bytes, jpeg_quality(quality))
                    .write_image(
                        rgb.as_raw(),
                        rgb.width(),
                        rgb.height(),
                        ExtendedColorType::Rgb8,
                    )
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
            }
        }
        Ok(bytes)
    }

    fn has_transparency(&self, image: &DynamicImage) -> bool {
        if !image.color().has_alpha() {
            return false;
        }
        image.to_rgba8().pixels().any(|p| p.0[3] < u8::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn opaque_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 40, 10])))
    }

    fn translucent_image() -> DynamicImage {
        let mut img = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255]));
        img.put_pixel(3, 3, Rgba([0, 0, 255, 10]));
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_png_round_trip_is_pixel_identical() {
        let codec = ImageCrateCodec::new();
        let original = translucent_image();

        let bytes = codec.encode(&original, EncodeFormat::Png, 1.0).unwrap();
        let decoded = codec.decode(&bytes).unwrap();

        assert_eq!(decoded.to_rgba8(), original.to_rgba8());
    }

    #[test]
    fn test_jpeg_round_trip_keeps_dimensions() {
        let codec = ImageCrateCodec::new();
        let original = opaque_image();

        let bytes = codec.encode(&original, EncodeFormat::Jpeg, 0.7).unwrap();
        let decoded = codec.decode(&bytes).unwrap();

        assert_eq!(decoded.width(), 8);
        assert_eq!(decoded.height(), 8);
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_jpeg_drops_alpha() {
        let codec = ImageCrateCodec::new();
        let bytes = codec
            .encode(&translucent_image(), EncodeFormat::Jpeg, 0.9)
            .unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert!(!codec.has_transparency(&decoded));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = ImageCrateCodec::new();
        let result = codec.decode(b"<html>not found</html>");
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_has_transparency() {
        let codec = ImageCrateCodec::new();
        assert!(!codec.has_transparency(&opaque_image()));
        assert!(codec.has_transparency(&translucent_image()));

        let opaque_rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            4,
            4,
            Rgba([1, 2, 3, 255]),
        ));
        assert!(!codec.has_transparency(&opaque_rgba));
    }

    #[test]
    fn test_jpeg_quality_mapping() {
        assert_eq!(jpeg_quality(0.7), 70);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(2.0), 100);
    }
}
