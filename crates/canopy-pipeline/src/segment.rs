//! Plant/soil segmentation.
//!
//! A two-stage threshold-and-smooth heuristic:
//!
//! 1. Mark a pixel as a plant candidate when `green - red > COLOR_THRESHOLD`.
//! 2. Smooth the `{0, 255}` candidate image with the configured kernel.
//! 3. Re-threshold the smoothed image at `MASK_THRESHOLD`.
//!
//! When a raster has no-data pixels, the smoothed value is renormalized
//! by the smoothed share of data pixels, so no-data neither adds to nor
//! dilutes the plant signal of its neighbours.
//!
//! The constants are the tuned operating point of the heuristic and are
//! intentionally not part of [`PipelineConfig`](crate::PipelineConfig).
//! Rasters that are already binary masks pass through unchanged.

use crate::blur::SmoothingKernel;
use crate::types::{
    BACKGROUND, FOREGROUND, GrayImage, Mask, Pixels, PipelineError, Raster, RgbImage, RgbaImage,
};

/// Minimum `green - red` margin (exclusive) for a plant candidate.
pub const COLOR_THRESHOLD: i16 = 2;

/// Smoothed value at or above which a pixel is plant.
pub const MASK_THRESHOLD: u8 = 128;

/// Classify every pixel of `raster` as plant or soil.
///
/// RGBA pixels whose alpha is `0` are classified as soil here; the
/// clipper excludes them from ratio computation separately. They do not
/// weigh on the smoothing of neighbouring data pixels.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidRaster`] if the raster has a single
/// non-binary channel, which carries no red/green information.
#[must_use = "returns the plant/soil mask"]
pub fn segment(raster: &Raster, kernel: SmoothingKernel) -> Result<Mask, PipelineError> {
    let candidates = match raster.pixels() {
        Pixels::Mask(mask) | Pixels::MaskWithNoData { mask, .. } => return Ok(mask.clone()),
        Pixels::Rgb(rgb) => color_threshold_rgb(rgb),
        Pixels::Rgba(rgba) if rgba.pixels().any(|p| p.0[3] == 0) => {
            let smoothed = smooth_data_pixels(kernel, &color_threshold_rgba(rgba), rgba);
            return Ok(rethreshold(&smoothed));
        }
        Pixels::Rgba(rgba) => color_threshold_rgba(rgba),
        Pixels::Gray(_) => {
            return Err(PipelineError::InvalidRaster(
                "single-channel raster is not a binary mask; red and green channels are required"
                    .to_string(),
            ));
        }
    };

    let smoothed = kernel.smooth(&candidates);
    Ok(rethreshold(&smoothed))
}

/// Whether a red/green pair passes the colour threshold.
///
/// Computed in `i16` so `green - red` cannot overflow.
#[must_use]
pub fn is_plant_candidate(red: u8, green: u8) -> bool {
    i16::from(green) - i16::from(red) > COLOR_THRESHOLD
}

fn candidate_sample(red: u8, green: u8) -> image::Luma<u8> {
    image::Luma([if is_plant_candidate(red, green) {
        FOREGROUND
    } else {
        BACKGROUND
    }])
}

/// First-pass `{0, 255}` candidate image for three-channel input.
#[must_use = "returns the candidate image"]
pub fn color_threshold_rgb(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, _] = image.get_pixel(x, y).0;
        candidate_sample(r, g)
    })
}

/// First-pass `{0, 255}` candidate image for four-channel input.
#[must_use = "returns the candidate image"]
pub fn color_threshold_rgba(image: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, _, a] = image.get_pixel(x, y).0;
        if a == 0 {
            image::Luma([BACKGROUND])
        } else {
            candidate_sample(r, g)
        }
    })
}

/// Smooth `candidates` over the data pixels of `rgba` only.
///
/// Both the candidates and the data-pixel indicator are smoothed; their
/// ratio is the plant share among the data pixels under the kernel.
/// No-data pixels come out as [`BACKGROUND`].
fn smooth_data_pixels(kernel: SmoothingKernel, candidates: &GrayImage, rgba: &RgbaImage) -> GrayImage {
    let indicator = GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        image::Luma([if rgba.get_pixel(x, y).0[3] == 0 {
            BACKGROUND
        } else {
            FOREGROUND
        }])
    });
    let plant = kernel.smooth(candidates);
    let weight = kernel.smooth(&indicator);

    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let data = u32::from(weight.get_pixel(x, y).0[0]);
        if rgba.get_pixel(x, y).0[3] == 0 || data == 0 {
            return image::Luma([BACKGROUND]);
        }
        let share = u32::from(plant.get_pixel(x, y).0[0]) * u32::from(FOREGROUND) / data;
        image::Luma([u8::try_from(share).unwrap_or(FOREGROUND)])
    })
}

/// Re-threshold a smoothed image into a mask at [`MASK_THRESHOLD`].
#[must_use = "returns the re-thresholded mask"]
pub fn rethreshold(smoothed: &GrayImage) -> Mask {
    let mut out = smoothed.clone();
    for sample in out.iter_mut() {
        *sample = if *sample >= MASK_THRESHOLD {
            FOREGROUND
        } else {
            BACKGROUND
        };
    }
    Mask::from_thresholded(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Dimensions;

    const GREEN: image::Rgb<u8> = image::Rgb([40, 160, 30]);
    const SOIL: image::Rgb<u8> = image::Rgb([120, 100, 80]);

    fn segment_default(raster: &Raster) -> Mask {
        segment(raster, SmoothingKernel::default()).unwrap()
    }

    fn rgb_raster(image: RgbImage) -> Raster {
        Raster::new(Pixels::Rgb(image), None)
    }

    #[test]
    fn candidate_threshold_is_exclusive() {
        assert!(!is_plant_candidate(100, 102), "diff == 2 must be soil");
        assert!(is_plant_candidate(100, 103), "diff == 3 must be plant");
    }

    #[test]
    fn candidate_difference_does_not_overflow() {
        assert!(is_plant_candidate(0, 255));
        assert!(!is_plant_candidate(255, 0));
    }

    #[test]
    fn all_black_image_has_no_plants() {
        let mask = segment_default(&rgb_raster(RgbImage::new(8, 8)));
        assert_eq!(mask.count_foreground(), 0);
    }

    #[test]
    fn all_white_image_has_no_plants() {
        let img = RgbImage::from_pixel(8, 8, image::Rgb([255, 255, 255]));
        let mask = segment_default(&rgb_raster(img));
        assert_eq!(
            mask.count_foreground(),
            0,
            "white saturation must not read as canopy"
        );
    }

    #[test]
    fn all_green_image_is_all_plant() {
        let img = RgbImage::from_pixel(8, 8, GREEN);
        let mask = segment_default(&rgb_raster(img));
        assert_eq!(mask.count_foreground(), 64);
    }

    #[test]
    fn half_green_image_keeps_straight_boundary() {
        let img = RgbImage::from_fn(10, 10, |x, _| if x < 5 { GREEN } else { SOIL });
        let mask = segment_default(&rgb_raster(img));
        assert_eq!(mask.count_foreground(), 50);
        assert!(mask.get(4, 0));
        assert!(!mask.get(5, 0));
    }

    #[test]
    fn isolated_green_pixel_is_smoothed_away() {
        let img = RgbImage::from_fn(9, 9, |x, y| if x == 4 && y == 4 { GREEN } else { SOIL });
        let mask = segment_default(&rgb_raster(img));
        assert_eq!(mask.count_foreground(), 0);
    }

    #[test]
    fn isolated_soil_pixel_is_filled() {
        let img = RgbImage::from_fn(9, 9, |x, y| if x == 4 && y == 4 { SOIL } else { GREEN });
        let mask = segment_default(&rgb_raster(img));
        assert_eq!(mask.count_foreground(), 81);
    }

    #[test]
    fn zero_radius_box_disables_smoothing() {
        let img = RgbImage::from_fn(9, 9, |x, y| if x == 4 && y == 4 { GREEN } else { SOIL });
        let mask = segment(&rgb_raster(img), SmoothingKernel::Box { radius: 0 }).unwrap();
        assert_eq!(mask.count_foreground(), 1);
    }

    #[test]
    fn rgba_nodata_pixels_are_soil() {
        let img = RgbaImage::from_fn(6, 6, |x, _| {
            let alpha = if x < 3 { 0 } else { 255 };
            image::Rgba([40, 160, 30, alpha])
        });
        let mask = segment(
            &Raster::new(Pixels::Rgba(img), None),
            SmoothingKernel::Box { radius: 0 },
        )
        .unwrap();
        assert_eq!(mask.count_foreground(), 18);
    }

    #[test]
    fn plant_next_to_nodata_survives_smoothing() {
        // A 3x3 plant block in the corner of an otherwise transparent
        // image. Its inner corner pixel sees only 4 data pixels in its
        // 3x3 window, all plant.
        let img = RgbaImage::from_fn(6, 6, |x, y| {
            let alpha = if x < 3 && y < 3 { 255 } else { 0 };
            image::Rgba([40, 160, 30, alpha])
        });
        let mask = segment_default(&Raster::new(Pixels::Rgba(img), None));
        assert_eq!(mask.count_foreground(), 9);
        assert!(mask.get(2, 2));
        assert!(!mask.get(3, 3), "no-data pixels stay soil");
    }

    #[test]
    fn soil_next_to_nodata_stays_soil() {
        let img = RgbaImage::from_fn(6, 6, |x, _| match x {
            0 | 1 => image::Rgba([0, 0, 0, 0]),
            2 | 3 => image::Rgba([120, 100, 80, 255]),
            _ => image::Rgba([40, 160, 30, 255]),
        });
        let mask = segment_default(&Raster::new(Pixels::Rgba(img), None));
        assert_eq!(mask.count_foreground(), 12);
        assert!(!mask.get(2, 0));
        assert!(mask.get(4, 0));
    }

    #[test]
    fn mask_with_nodata_passes_through_unchanged() {
        let img = image::GrayAlphaImage::from_fn(4, 4, |x, y| {
            image::LumaA([if x < 2 { 255 } else { 0 }, if y == 0 { 0 } else { 255 }])
        });
        let raster = Raster::from_gray_alpha(&img, None);
        let mask = segment_default(&raster);
        assert_eq!(mask.count_foreground(), 6);
        assert!(!mask.get(0, 0), "no-data reads as soil");
    }

    #[test]
    fn mask_input_passes_through_unchanged() {
        let mask = Mask::from_fn(7, 5, |x, y| (x + y) % 3 == 0);
        let raster = Raster::from(mask.clone());
        assert_eq!(segment_default(&raster), mask);
    }

    #[test]
    fn segmenting_a_segmented_mask_is_idempotent() {
        let img = RgbImage::from_fn(12, 12, |x, y| if x * y < 30 { GREEN } else { SOIL });
        let once = segment_default(&rgb_raster(img));
        let twice = segment_default(&Raster::from(once.clone()));
        assert_eq!(once, twice);
    }

    #[test]
    fn gray_raster_is_rejected() {
        let raster = Raster::from_single_channel(GrayImage::from_pixel(4, 4, image::Luma([77])), None);
        let result = segment(&raster, SmoothingKernel::default());
        assert!(matches!(result, Err(PipelineError::InvalidRaster(_))));
    }

    #[test]
    fn output_dimensions_match_input() {
        let mask = segment_default(&rgb_raster(RgbImage::new(17, 31)));
        assert_eq!(
            mask.dimensions(),
            Dimensions {
                width: 17,
                height: 31
            }
        );
    }

    #[test]
    fn rethreshold_boundary_is_inclusive() {
        let img = GrayImage::from_fn(3, 1, |x, _| image::Luma([[127, 128, 200][x as usize]]));
        let mask = rethreshold(&img);
        assert_eq!(mask.as_image().as_raw(), &vec![0, 255, 255]);
    }
}
