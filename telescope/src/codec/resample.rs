//! Image resampling.

use image::imageops::FilterType;
use image::DynamicImage;

/// Produces a copy of an image at a target size.
pub trait Resampler: Send + Sync {
    /// Resize `image` to exactly `width` x `height` pixels.
    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage;
}

/// [`Resampler`] using the `image` crate's filters.
#[derive(Debug, Clone, Copy)]
pub struct ImageResampler {
    filter: FilterType,
}

impl ImageResampler {
    /// Resampler with the given filter.
    pub fn new(filter: FilterType) -> Self {
        Self { filter }
    }
}

impl Default for ImageResampler {
    fn default() -> Self {
        Self::new(FilterType::Lanczos3)
    }
}

impl Resampler for ImageResampler {
    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        image.resize_exact(width, height, self.filter)
    }
}
