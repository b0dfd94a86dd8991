//! Mask smoothing between the colour threshold and the re-threshold.
//!
//! The first threshold leaves isolated speckle along leaf edges and in
//! soil texture. Smoothing the `{0, 255}` mask and re-thresholding at
//! the midpoint removes single-pixel noise and fills single-pixel holes
//! while leaving large regions untouched.
//!
//! [`box_blur`] wraps [`imageproc::filter::box_filter`], whose separable
//! passes use integer division, so a constant field is reproduced
//! exactly. [`gaussian_blur`] is the softer alternative for imagery with
//! heavier texture.

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Smoothing kernel applied to the first-pass mask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SmoothingKernel {
    /// Mean over a `(2 * radius + 1)` square window. Radius `0` is a no-op.
    Box {
        /// Half-width of the window in pixels.
        radius: u32,
    },
    /// Gaussian with standard deviation `sigma` in pixels. Non-positive
    /// sigma is a no-op.
    Gaussian {
        /// Standard deviation in pixels.
        sigma: f32,
    },
}

impl SmoothingKernel {
    /// Apply this kernel to a single-channel image.
    #[must_use = "returns the smoothed image"]
    pub fn smooth(self, image: &GrayImage) -> GrayImage {
        match self {
            Self::Box { radius } => box_blur(image, radius),
            Self::Gaussian { sigma } => gaussian_blur(image, sigma),
        }
    }
}

impl Default for SmoothingKernel {
    fn default() -> Self {
        Self::Box { radius: 1 }
    }
}

/// Apply a square box (mean) filter.
///
/// Edge pixels are extended outward, so the output has the input's
/// dimensions. Radius `0` returns the image unchanged. Radii beyond the
/// longer image side are clamped to it.
#[must_use = "returns the blurred image"]
pub fn box_blur(image: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }

    let radius = radius.min(longest_side(image));
    imageproc::filter::box_filter(image, radius, radius)
}

/// Apply Gaussian blur to a single-channel image.
///
/// Non-positive or NaN sigma values return the image unchanged, since
/// `imageproc`'s underlying function panics on `sigma <= 0.0`. Sigmas
/// beyond the longer image side are clamped to it.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma.is_nan() || sigma <= 0.0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }

    #[allow(clippy::cast_precision_loss)]
    let sigma = sigma.min(longest_side(image) as f32);
    imageproc::filter::gaussian_blur_f32(image, sigma)
}

fn longest_side(image: &GrayImage) -> u32 {
    image.width().max(image.height())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A mask with a sharp background-to-foreground boundary at x=5.
    fn sharp_edge_mask() -> GrayImage {
        GrayImage::from_fn(10, 10, |x, _y| {
            if x < 5 {
                image::Luma([0])
            } else {
                image::Luma([255])
            }
        })
    }

    fn single_pixel(value: u8, background: u8) -> GrayImage {
        GrayImage::from_fn(7, 7, |x, y| {
            if x == 3 && y == 3 {
                image::Luma([value])
            } else {
                image::Luma([background])
            }
        })
    }

    #[test]
    fn zero_radius_returns_identical_image() {
        let img = sharp_edge_mask();
        assert_eq!(box_blur(&img, 0), img);
    }

    #[test]
    fn non_positive_sigma_returns_identical_image() {
        let img = sharp_edge_mask();
        assert_eq!(gaussian_blur(&img, 0.0), img);
        assert_eq!(gaussian_blur(&img, -1.0), img);
    }

    #[test]
    fn output_dimensions_preserved() {
        let img = GrayImage::new(17, 31);
        let boxed = box_blur(&img, 1);
        assert_eq!((boxed.width(), boxed.height()), (17, 31));
        let blurred = gaussian_blur(&img, 1.4);
        assert_eq!((blurred.width(), blurred.height()), (17, 31));
    }

    #[test]
    fn empty_image_is_passed_through() {
        let img = GrayImage::new(0, 0);
        assert_eq!(box_blur(&img, 1), img);
        assert_eq!(gaussian_blur(&img, 2.0), img);
    }

    #[test]
    fn box_blur_preserves_constant_fields() {
        for value in [0, 255] {
            let img = GrayImage::from_pixel(6, 4, image::Luma([value]));
            let blurred = box_blur(&img, 1);
            assert!(
                blurred.pixels().all(|p| p.0[0] == value),
                "expected constant {value} field to survive box blur",
            );
        }
    }

    #[test]
    fn box_blur_suppresses_isolated_foreground_pixel() {
        let blurred = box_blur(&single_pixel(255, 0), 1);
        let center = blurred.get_pixel(3, 3).0[0];
        assert!(center < 128, "expected speckle to fall below midpoint, got {center}");
    }

    #[test]
    fn box_blur_fills_isolated_hole() {
        let blurred = box_blur(&single_pixel(0, 255), 1);
        let center = blurred.get_pixel(3, 3).0[0];
        assert!(center >= 128, "expected hole to rise above midpoint, got {center}");
    }

    #[test]
    fn box_blur_keeps_straight_edge_in_place() {
        let blurred = box_blur(&sharp_edge_mask(), 1);
        for y in 0..10 {
            assert!(blurred.get_pixel(4, y).0[0] < 128, "row {y}: x=4 crossed the edge");
            assert!(blurred.get_pixel(5, y).0[0] >= 128, "row {y}: x=5 lost the edge");
        }
    }

    #[test]
    fn gaussian_blur_smooths_sharp_edge() {
        let blurred = gaussian_blur(&sharp_edge_mask(), 2.0);
        let left_of_edge = blurred.get_pixel(4, 5).0[0];
        let right_of_edge = blurred.get_pixel(5, 5).0[0];
        assert!(
            left_of_edge > 0,
            "expected blur to raise left-of-edge above 0, got {left_of_edge}",
        );
        assert!(
            right_of_edge < 255,
            "expected blur to lower right-of-edge below 255, got {right_of_edge}",
        );
    }

    #[test]
    fn oversized_box_radius_is_clamped() {
        let img = single_pixel(255, 0);
        let blurred = box_blur(&img, 1 << 31);
        assert_eq!(blurred, box_blur(&img, 7));
    }

    #[test]
    fn oversized_sigma_is_clamped() {
        let img = single_pixel(255, 0);
        assert_eq!(gaussian_blur(&img, f32::INFINITY), gaussian_blur(&img, 7.0));
        assert_eq!(gaussian_blur(&img, f32::NAN), img);
    }

    #[test]
    fn kernel_dispatches_to_matching_filter() {
        let img = single_pixel(255, 0);
        assert_eq!(
            SmoothingKernel::Box { radius: 1 }.smooth(&img),
            box_blur(&img, 1)
        );
        assert_eq!(
            SmoothingKernel::Gaussian { sigma: 1.5 }.smooth(&img),
            gaussian_blur(&img, 1.5)
        );
    }
}
