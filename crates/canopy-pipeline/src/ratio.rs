//! Ratio reduction: plant pixels over usable pixels, as a percentage.
//!
//! Counting is done with integers, so the only rounding is the final
//! division.

use serde::{Deserialize, Serialize};

use crate::types::{ClippedRegion, Cover, Mask};

/// Reduced value for one clipped region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CoverValue {
    /// Canopy cover in `[0.0, 100.0]`.
    Percent(f64),
    /// The region had no usable pixels, or too many no-data pixels.
    NoData,
}

impl From<CoverValue> for Cover {
    fn from(value: CoverValue) -> Self {
        match value {
            CoverValue::Percent(p) => Self::Percent(p),
            CoverValue::NoData => Self::NoData,
        }
    }
}

/// Pixel counts behind one ratio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionStats {
    /// Pixels in the bounding window.
    pub window_pixels: u64,
    /// Pixels inside the boundary flagged as no-data.
    pub nodata_pixels: u64,
    /// Pixels inside the boundary carrying data.
    pub included_pixels: u64,
    /// Included pixels classified as plant.
    pub foreground_pixels: u64,
}

impl RegionStats {
    /// Share of in-boundary pixels that are no-data.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn nodata_fraction(&self) -> f64 {
        let inside = self.included_pixels + self.nodata_pixels;
        if inside == 0 {
            return 0.0;
        }
        self.nodata_pixels as f64 / inside as f64
    }

    /// Reduce the counts to a cover value.
    ///
    /// Returns [`CoverValue::NoData`] when no pixel is included or when
    /// the no-data share exceeds `max_nodata_fraction`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cover(&self, max_nodata_fraction: f64) -> CoverValue {
        if self.included_pixels == 0 || self.nodata_fraction() > max_nodata_fraction {
            return CoverValue::NoData;
        }
        CoverValue::Percent(self.foreground_pixels as f64 * 100.0 / self.included_pixels as f64)
    }
}

/// Count included and plant pixels of `mask` over `region`.
///
/// `mask` covers the whole raster; `region.inclusion` covers only the
/// region's window.
#[must_use]
pub fn region_stats(mask: &Mask, region: &ClippedRegion) -> RegionStats {
    let window = region.window;
    let mut stats = RegionStats {
        window_pixels: window.pixel_count(),
        nodata_pixels: region.nodata_pixels,
        ..RegionStats::default()
    };
    for j in 0..window.height {
        for i in 0..window.width {
            if region.inclusion.get(i, j) {
                stats.included_pixels += 1;
                stats.foreground_pixels += u64::from(mask.get(window.x + i, window.y + j));
            }
        }
    }
    stats
}

/// Canopy cover of `mask` over `region`.
#[must_use]
pub fn ratio(mask: &Mask, region: &ClippedRegion, max_nodata_fraction: f64) -> CoverValue {
    region_stats(mask, region).cover(max_nodata_fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Dimensions, PixelWindow};

    fn whole(mask: &Mask) -> ClippedRegion {
        let Dimensions { width, height } = mask.dimensions();
        ClippedRegion {
            window: PixelWindow {
                x: 0,
                y: 0,
                width,
                height,
            },
            inclusion: Mask::filled(mask.dimensions(), true),
            nodata_pixels: 0,
        }
    }

    #[test]
    fn empty_region_is_no_data() {
        let mask = Mask::from_fn(4, 4, |_, _| true);
        assert_eq!(ratio(&mask, &ClippedRegion::empty(), 0.75), CoverValue::NoData);
    }

    #[test]
    fn all_background_is_exactly_zero() {
        let mask = Mask::from_fn(5, 5, |_, _| false);
        assert_eq!(ratio(&mask, &whole(&mask), 0.75), CoverValue::Percent(0.0));
    }

    #[test]
    fn all_foreground_is_exactly_one_hundred() {
        let mask = Mask::from_fn(5, 5, |_, _| true);
        assert_eq!(ratio(&mask, &whole(&mask), 0.75), CoverValue::Percent(100.0));
    }

    #[test]
    fn half_foreground_is_fifty_percent() {
        let mask = Mask::from_fn(10, 10, |x, _| x < 5);
        assert_eq!(ratio(&mask, &whole(&mask), 0.75), CoverValue::Percent(50.0));
    }

    #[test]
    fn excluded_pixels_leave_numerator_and_denominator() {
        // Only the left column is included; it is all plant.
        let mask = Mask::from_fn(4, 4, |x, _| x == 0);
        let region = ClippedRegion {
            inclusion: Mask::from_fn(4, 4, |x, _| x == 0),
            ..whole(&mask)
        };
        assert_eq!(ratio(&mask, &region, 0.75), CoverValue::Percent(100.0));
    }

    #[test]
    fn offset_window_reads_matching_mask_pixels() {
        let mask = Mask::from_fn(6, 6, |x, y| x >= 3 && y >= 3);
        let region = ClippedRegion {
            window: PixelWindow {
                x: 3,
                y: 3,
                width: 3,
                height: 3,
            },
            inclusion: Mask::from_fn(3, 3, |_, _| true),
            nodata_pixels: 0,
        };
        assert_eq!(ratio(&mask, &region, 0.75), CoverValue::Percent(100.0));
    }

    #[test]
    fn nodata_share_above_limit_is_no_data() {
        let mask = Mask::from_fn(2, 2, |_, _| true);
        let region = ClippedRegion {
            inclusion: Mask::from_fn(2, 2, |x, y| x == 0 && y == 0),
            nodata_pixels: 3,
            ..whole(&mask)
        };
        let stats = region_stats(&mask, &region);
        assert!((stats.nodata_fraction() - 0.75).abs() < f64::EPSILON);
        assert_eq!(stats.cover(0.75), CoverValue::Percent(100.0), "0.75 is not above 0.75");
        assert_eq!(stats.cover(0.5), CoverValue::NoData);
    }

    #[test]
    fn stats_count_every_category() {
        let mask = Mask::from_fn(4, 1, |x, _| x % 2 == 0);
        let region = ClippedRegion {
            inclusion: Mask::from_fn(4, 1, |x, _| x < 3),
            nodata_pixels: 1,
            ..whole(&mask)
        };
        assert_eq!(
            region_stats(&mask, &region),
            RegionStats {
                window_pixels: 4,
                nodata_pixels: 1,
                included_pixels: 3,
                foreground_pixels: 2,
            }
        );
    }

    #[test]
    fn percentages_stay_in_range() {
        for n in 0..=9 {
            let mask = Mask::from_fn(3, 3, |x, y| y * 3 + x < n);
            match ratio(&mask, &whole(&mask), 0.75) {
                CoverValue::Percent(p) => assert!((0.0..=100.0).contains(&p), "{p} out of range"),
                CoverValue::NoData => unreachable!("full region must produce a percentage"),
            }
        }
    }
}
