//! Encoding format selection for images written to disk.

/// Container format chosen for an encoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeFormat {
    /// Lossless, preserves alpha.
    Png,
    /// Lossy, no alpha channel.
    Jpeg,
}

/// Policy deciding how a decoded image is encoded before it reaches disk.
///
/// Selection depends only on the image's own transparency, so re-encoding the
/// same image under the same policy always picks the same format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormatPolicy {
    /// Always PNG.
    Png,
    /// PNG when the image has transparency, JPEG at `quality` otherwise.
    PngIfTransparent {
        /// JPEG quality in `0.0..=1.0`.
        quality: f32,
    },
    /// Always JPEG at `quality`.
    Jpeg {
        /// JPEG quality in `0.0..=1.0`.
        quality: f32,
    },
}

/// JPEG quality used by the default policy.
pub const DEFAULT_JPEG_QUALITY: f32 = 0.7;

impl Default for FormatPolicy {
    fn default() -> Self {
        Self::PngIfTransparent {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl FormatPolicy {
    /// Pick the format and quality for an image.
    ///
    /// Quality is clamped to `0.0..=1.0`. PNG always reports `1.0`.
    pub fn select(&self, has_transparency: bool) -> (EncodeFormat, f32) {
        match *self {
            Self::Png => (EncodeFormat::Png, 1.0),
            Self::PngIfTransparent { .. } if has_transparency => (EncodeFormat::Png, 1.0),
            Self::PngIfTransparent { quality } | Self::Jpeg { quality } => {
                (EncodeFormat::Jpeg, quality.clamp(0.0, 1.0))
            }
        }
    }

    /// Parse a policy name as used in the config file.
    pub fn from_name(name: &str, quality: f32) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "png_if_transparent" => Some(Self::PngIfTransparent { quality }),
            "jpeg" | "jpg" => Some(Self::Jpeg { quality }),
            _ => None,
        }
    }
}
