//! Reference attribute inference
//!
//! A fixed rule table, not a learned model: the dominant color comes from
//! channel means over non-background pixels, the shape hint from the aspect
//! ratio of the reference photo. Both are approximate by nature.

use crate::types::{ColorLabel, ProductCategory, ReferenceAttributes};
use image::{DynamicImage, GenericImageView};

/// Side of the thumbnail used for color statistics
const COLOR_SAMPLE_DIMENSION: u32 = 100;

/// Pixels whose channel mean reaches this level are treated as backdrop
const NEAR_WHITE_LEVEL: f64 = 230.0;

/// Maximum pairwise channel spread for the achromatic family
const GREY_SPREAD: f64 = 25.0;

/// Margin by which one channel must dominate both others
const DOMINANCE_MARGIN: f64 = 30.0;

/// Width/height ratio above which a reference reads as wide
const WIDE_RATIO: f64 = 1.2;

/// Descriptor emitted for wide references
pub const WIDE_SHAPE_HINT: &str = "wide sectional corner shape";

/// Prompt words that name seating which can come in sectional form
const SECTIONAL_TERMS: &[&str] = &["sofa", "couch", "sectional", "settee", "loveseat", "canapé", "canape"];

/// Mean red, green and blue of a set of pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMeans {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

/// Channel means over the non-backdrop pixels of an image
///
/// The image is reduced to at most 100x100 first. If every pixel looks like
/// backdrop, the unmasked set is used instead.
#[must_use]
pub fn foreground_channel_means(image: &DynamicImage) -> ChannelMeans {
    let sample = if image.width() > COLOR_SAMPLE_DIMENSION || image.height() > COLOR_SAMPLE_DIMENSION
    {
        image.thumbnail(COLOR_SAMPLE_DIMENSION, COLOR_SAMPLE_DIMENSION)
    } else {
        image.clone()
    };
    let rgb = sample.to_rgb8();

    let mut all = [0.0f64; 3];
    let mut foreground = [0.0f64; 3];
    let mut all_count = 0u64;
    let mut foreground_count = 0u64;

    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0;
        let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
        all[0] += r;
        all[1] += g;
        all[2] += b;
        all_count += 1;

        if (r + g + b) / 3.0 < NEAR_WHITE_LEVEL {
            foreground[0] += r;
            foreground[1] += g;
            foreground[2] += b;
            foreground_count += 1;
        }
    }

    let (sums, count) = if foreground_count > 0 {
        (foreground, foreground_count)
    } else {
        (all, all_count)
    };

    if count == 0 {
        return ChannelMeans {
            red: 0.0,
            green: 0.0,
            blue: 0.0,
        };
    }

    let n = count as f64;
    ChannelMeans {
        red: sums[0] / n,
        green: sums[1] / n,
        blue: sums[2] / n,
    }
}

/// Classify channel means into a color label
///
/// Rules apply in precedence order; the first match wins.
#[must_use]
pub fn classify_color(means: ChannelMeans) -> ColorLabel {
    let ChannelMeans {
        red: r,
        green: g,
        blue: b,
    } = means;

    if (r - g).abs() < GREY_SPREAD && (g - b).abs() < GREY_SPREAD && (r - b).abs() < GREY_SPREAD {
        return if r < 70.0 {
            ColorLabel::Black
        } else if r > 200.0 {
            ColorLabel::White
        } else {
            ColorLabel::Grey
        };
    }

    if r > g + DOMINANCE_MARGIN && r > b + DOMINANCE_MARGIN {
        return if g > 100.0 {
            ColorLabel::Orange
        } else {
            ColorLabel::Red
        };
    }

    if g > r + DOMINANCE_MARGIN && g > b + DOMINANCE_MARGIN {
        return ColorLabel::Green;
    }

    if b > r + DOMINANCE_MARGIN && b > g + DOMINANCE_MARGIN {
        return if r > 100.0 {
            ColorLabel::Purple
        } else {
            ColorLabel::Blue
        };
    }

    if r > 150.0 && g > 150.0 && b < 100.0 {
        return ColorLabel::Yellow;
    }

    if r > 100.0 && g < 100.0 && b < 100.0 {
        return ColorLabel::Brown;
    }

    ColorLabel::Unknown
}

/// Dominant color of a reference product image
#[must_use]
pub fn infer_dominant_color(image: &DynamicImage) -> ColorLabel {
    classify_color(foreground_channel_means(image))
}

/// Coarse shape descriptor from the reference aspect ratio
///
/// Wide photos usually show sectional or corner pieces; anything else gets no
/// descriptor. Approximate only.
#[must_use]
pub fn infer_shape_hint(image: &DynamicImage) -> String {
    let (width, height) = image.dimensions();
    if height == 0 {
        return String::new();
    }
    if f64::from(width) / f64::from(height) > WIDE_RATIO {
        WIDE_SHAPE_HINT.to_string()
    } else {
        String::new()
    }
}

/// Whether a shape descriptor is meaningful for the requested product
///
/// Only seating comes in sectional or corner layouts. An explicit category
/// wins; without one the prompt is searched for seating terms.
#[must_use]
pub fn shape_hint_applies(user_prompt: &str, category: Option<ProductCategory>) -> bool {
    match category {
        Some(category) => category == ProductCategory::Couch,
        None => {
            let prompt = user_prompt.to_lowercase();
            SECTIONAL_TERMS.iter().any(|term| prompt.contains(term))
        },
    }
}

/// Trait for reference attribute inference
pub trait AttributeAnalyzer: Send + Sync {
    /// Infer the attributes used to steer a staging prompt
    fn analyze(
        &self,
        reference: &DynamicImage,
        user_prompt: &str,
        category: Option<ProductCategory>,
    ) -> ReferenceAttributes;
}

/// Rule-table analyzer built on the pure inference functions
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAnalyzer;

impl AttributeAnalyzer for HeuristicAnalyzer {
    fn analyze(
        &self,
        reference: &DynamicImage,
        user_prompt: &str,
        category: Option<ProductCategory>,
    ) -> ReferenceAttributes {
        let dominant_color = infer_dominant_color(reference);
        let shape_hint = if shape_hint_applies(user_prompt, category) {
            infer_shape_hint(reference)
        } else {
            String::new()
        };

        tracing::debug!(
            color = %dominant_color,
            shape_hint = %shape_hint,
            "Inferred reference attributes"
        );

        ReferenceAttributes {
            dominant_color,
            shape_hint,
        }
    }
}
