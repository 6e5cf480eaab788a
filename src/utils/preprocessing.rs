//! Shared image preprocessing utilities
//!
//! Every image that reaches the generation backend passes through here:
//! bounding to a maximum dimension, keeping base image and mask aligned, and
//! deriving the edge map used for structural conditioning.

use crate::{
    config::PipelineConfig,
    error::{LuminaError, Result},
    utils::edges,
};
use image::{imageops::FilterType, DynamicImage, GenericImageView, GrayImage};
use tracing::{debug, warn};

/// Edit inputs are snapped to multiples of this value
const DIMENSION_MULTIPLE: u32 = 8;

/// Aspect mismatch between image and mask above which a warning is logged
const ASPECT_TOLERANCE: f32 = 0.01;

/// Options controlling preprocessing bounds and thresholds
#[derive(Debug, Clone)]
pub struct PreprocessingOptions {
    /// Longest side for edit inputs
    pub max_edit_dimension: u32,
    /// Longest side before edge detection
    pub max_structural_dimension: u32,
    /// Longest side for reference images
    pub max_reference_dimension: u32,
    /// Canny low threshold
    pub canny_low: f32,
    /// Canny high threshold
    pub canny_high: f32,
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PreprocessingOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_edit_dimension: config.max_edit_dimension,
            max_structural_dimension: config.max_structural_dimension,
            max_reference_dimension: config.max_reference_dimension,
            canny_low: config.canny_low_threshold,
            canny_high: config.canny_high_threshold,
        }
    }
}

/// Base image and mask after normalization, guaranteed to share dimensions
#[derive(Debug, Clone)]
pub struct PreparedEdit {
    pub image: DynamicImage,
    pub mask: GrayImage,
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Dimensions with the longer side bounded to `max_dimension`
    ///
    /// Aspect ratio is preserved and images are never upscaled. Each side is
    /// at least one pixel.
    #[must_use]
    pub fn bounded_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
        let longer = width.max(height);
        if longer <= max_dimension || longer == 0 {
            return (width, height);
        }

        let scale = f64::from(max_dimension) / f64::from(longer);
        let new_width = (f64::from(width) * scale).round().max(1.0) as u32;
        let new_height = (f64::from(height) * scale).round().max(1.0) as u32;
        (new_width.min(max_dimension), new_height.min(max_dimension))
    }

    /// Bounded dimensions floored to the backend's required multiple
    #[must_use]
    pub fn edit_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
        let (w, h) = Self::bounded_dimensions(width, height, max_dimension);
        let snap = |v: u32| ((v / DIMENSION_MULTIPLE) * DIMENSION_MULTIPLE).max(DIMENSION_MULTIPLE);
        (snap(w), snap(h))
    }

    /// Resize an image so its longer side fits `max_dimension`
    #[must_use]
    pub fn bound_image(image: &DynamicImage, max_dimension: u32) -> DynamicImage {
        let (width, height) = image.dimensions();
        let (new_width, new_height) = Self::bounded_dimensions(width, height, max_dimension);
        if (new_width, new_height) == (width, height) {
            return image.clone();
        }
        image.resize_exact(new_width, new_height, FilterType::Lanczos3)
    }

    /// Derive the edge map used to condition whole-room generation
    ///
    /// The image is bounded first so the gradient buffers stay small, then
    /// converted to luminance and run through Canny.
    #[must_use]
    pub fn prepare_structural(image: &DynamicImage, options: &PreprocessingOptions) -> GrayImage {
        let bounded = Self::bound_image(image, options.max_structural_dimension);
        let luma = bounded.to_luma8();
        debug!(
            width = luma.width(),
            height = luma.height(),
            low = options.canny_low,
            high = options.canny_high,
            "Computing edge map"
        );
        edges::canny(&luma, options.canny_low, options.canny_high)
    }

    /// Normalize base image and mask for inpainting
    ///
    /// The target size is computed from the base image alone and applied to
    /// both inputs with the same filter, so a mask uploaded at a different
    /// resolution still lands on the same pixels.
    ///
    /// # Errors
    /// - Either input has a zero dimension
    pub fn prepare_for_edit(
        image: &DynamicImage,
        mask: &DynamicImage,
        options: &PreprocessingOptions,
    ) -> Result<PreparedEdit> {
        let (width, height) = image.dimensions();
        let (mask_width, mask_height) = mask.dimensions();
        if width == 0 || height == 0 {
            return Err(LuminaError::invalid_input("base image has a zero dimension"));
        }
        if mask_width == 0 || mask_height == 0 {
            return Err(LuminaError::invalid_input("mask has a zero dimension"));
        }

        let image_aspect = width as f32 / height as f32;
        let mask_aspect = mask_width as f32 / mask_height as f32;
        if ((image_aspect - mask_aspect) / image_aspect).abs() > ASPECT_TOLERANCE {
            warn!(
                image = %format!("{}x{}", width, height),
                mask = %format!("{}x{}", mask_width, mask_height),
                "Mask aspect ratio differs from base image; stretching mask to image bounds"
            );
        }

        let (target_width, target_height) =
            Self::edit_dimensions(width, height, options.max_edit_dimension);

        let prepared_image = if (target_width, target_height) == (width, height) {
            image.clone()
        } else {
            image.resize_exact(target_width, target_height, FilterType::Lanczos3)
        };

        let mask_luma = mask.to_luma8();
        let prepared_mask = if (target_width, target_height) == (mask_width, mask_height) {
            mask_luma
        } else {
            image::imageops::resize(&mask_luma, target_width, target_height, FilterType::Lanczos3)
        };

        debug!(
            original = %format!("{}x{}", width, height),
            target = %format!("{}x{}", target_width, target_height),
            "Prepared edit inputs"
        );

        Ok(PreparedEdit {
            image: prepared_image,
            mask: prepared_mask,
        })
    }

    /// Bound a reference product image
    #[must_use]
    pub fn prepare_reference(image: &DynamicImage, options: &PreprocessingOptions) -> DynamicImage {
        Self::bound_image(image, options.max_reference_dimension)
    }
}
