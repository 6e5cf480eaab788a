//! Canny edge detection for structural conditioning
//!
//! Matches the behavior of the classic OpenCV call with default aperture:
//! 3x3 Sobel gradients, L1 magnitude, non-maximum suppression along the
//! quantized gradient direction and two-threshold hysteresis. No smoothing is
//! applied beforehand, so `imageproc::edges::canny` (which blurs first) is not
//! used directly; the gradients come from `imageproc::gradients`.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::{
    definitions::Image,
    gradients::{horizontal_sobel, vertical_sobel},
};

const EDGE: u8 = 255;

/// Single-channel float image
type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Gradient field of a grayscale image
struct Gradients {
    gx: Image<Luma<i16>>,
    gy: Image<Luma<i16>>,
    magnitude: FloatImage,
}

/// Run Canny edge detection and return a binary edge map (0 or 255)
#[must_use]
pub fn canny(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return GrayImage::new(width, height);
    }

    let gradients = sobel(image);
    let suppressed = non_maximum_suppression(&gradients);
    hysteresis(&suppressed, low_threshold, high_threshold)
}

/// Sobel gradients and their L1 magnitude
fn sobel(image: &GrayImage) -> Gradients {
    let gx = horizontal_sobel(image);
    let gy = vertical_sobel(image);
    let magnitude = FloatImage::from_fn(image.width(), image.height(), |x, y| {
        let a = f32::from(gx.get_pixel(x, y).0[0]);
        let b = f32::from(gy.get_pixel(x, y).0[0]);
        Luma([a.abs() + b.abs()])
    });

    Gradients { gx, gy, magnitude }
}

/// Keep only local maxima along the gradient direction
fn non_maximum_suppression(gradients: &Gradients) -> FloatImage {
    let (width, height) = gradients.magnitude.dimensions();
    let mut output = FloatImage::new(width, height);
    // tan(22.5°)
    let tan_22 = 0.414_213_56_f32;
    let mag_at = |x: u32, y: u32| gradients.magnitude.get_pixel(x, y).0[0];

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mag = mag_at(x, y);
            if mag == 0.0 {
                continue;
            }
            let gx = f32::from(gradients.gx.get_pixel(x, y).0[0]);
            let gy = f32::from(gradients.gy.get_pixel(x, y).0[0]);
            let (ax, ay) = (gx.abs(), gy.abs());

            let (a, b) = if ay <= ax * tan_22 {
                // Horizontal gradient: compare left/right
                (mag_at(x - 1, y), mag_at(x + 1, y))
            } else if ay >= ax / tan_22 {
                // Vertical gradient: compare up/down
                (mag_at(x, y - 1), mag_at(x, y + 1))
            } else if (gx > 0.0) == (gy > 0.0) {
                (mag_at(x - 1, y - 1), mag_at(x + 1, y + 1))
            } else {
                (mag_at(x + 1, y - 1), mag_at(x - 1, y + 1))
            };

            if mag > a && mag >= b {
                output.put_pixel(x, y, Luma([mag]));
            }
        }
    }

    output
}

/// Two-threshold hysteresis: strong pixels seed, weak pixels connected to them survive
fn hysteresis(magnitude: &FloatImage, low: f32, high: f32) -> GrayImage {
    let (width, height) = magnitude.dimensions();
    let mut edges = GrayImage::new(width, height);
    let mut stack: Vec<(u32, u32)> = Vec::new();

    for y in 0..height {
        for x in 0..width {
            if magnitude.get_pixel(x, y).0[0] > high && edges.get_pixel(x, y).0[0] == 0 {
                edges.put_pixel(x, y, Luma([EDGE]));
                stack.push((x, y));

                while let Some((cx, cy)) = stack.pop() {
                    for ny in cy.saturating_sub(1)..=(cy + 1).min(height - 1) {
                        for nx in cx.saturating_sub(1)..=(cx + 1).min(width - 1) {
                            if magnitude.get_pixel(nx, ny).0[0] > low
                                && edges.get_pixel(nx, ny).0[0] == 0
                            {
                                edges.put_pixel(nx, ny, Luma([EDGE]));
                                stack.push((nx, ny));
                            }
                        }
                    }
                }
            }
        }
    }

    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_count(edges: &GrayImage) -> usize {
        edges.pixels().filter(|p| p.0[0] == EDGE).count()
    }

    #[test]
    fn test_flat_image_has_no_edges() {
        let image = GrayImage::from_pixel(32, 32, Luma([128]));
        let edges = canny(&image, 100.0, 200.0);
        assert_eq!(edge_count(&edges), 0);
    }

    #[test]
    fn test_vertical_step_produces_vertical_edge() {
        let image = GrayImage::from_fn(32, 32, |x, _| if x < 16 { Luma([0]) } else { Luma([255]) });
        let edges = canny(&image, 100.0, 200.0);

        assert!(edge_count(&edges) > 0);
        for (x, _, pixel) in edges.enumerate_pixels() {
            if pixel.0[0] == EDGE {
                assert!((14..=17).contains(&x), "edge found at column {}", x);
            }
        }
        // A single thin line per row after suppression
        let row_edges = (0..32).filter(|&x| edges.get_pixel(x, 10).0[0] == EDGE).count();
        assert_eq!(row_edges, 1);
    }

    #[test]
    fn test_output_is_binary() {
        let image = GrayImage::from_fn(40, 24, |x, y| Luma([((x * 7 + y * 13) % 256) as u8]));
        let edges = canny(&image, 100.0, 200.0);
        assert!(edges.pixels().all(|p| p.0[0] == 0 || p.0[0] == EDGE));
        assert_eq!(edges.dimensions(), (40, 24));
    }

    #[test]
    fn test_weak_contrast_below_low_threshold_ignored() {
        // Step of 10 levels gives an L1 Sobel response of 40, below the low threshold
        let image = GrayImage::from_fn(32, 32, |x, _| if x < 16 { Luma([100]) } else { Luma([110]) });
        let edges = canny(&image, 100.0, 200.0);
        assert_eq!(edge_count(&edges), 0);
    }

    #[test]
    fn test_tiny_image_is_blank() {
        let image = GrayImage::from_pixel(2, 2, Luma([255]));
        let edges = canny(&image, 100.0, 200.0);
        assert_eq!(edges.dimensions(), (2, 2));
        assert_eq!(edge_count(&edges), 0);
    }
}
