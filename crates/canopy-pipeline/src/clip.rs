//! Clipping: which raster pixels lie inside a plot boundary.
//!
//! The polygon is mapped into pixel space through the inverse
//! geotransform to get a bounding window, then every pixel in the window
//! is tested by mapping its centre forward and asking whether the
//! polygon contains it. Pixel centres exactly on the outline are outside.

use geo::{Contains, Polygon};

use crate::georef::GeoTransform;
use crate::types::{
    BoundaryGeometry, ClippedRegion, Dimensions, Mask, PipelineError, PixelWindow, PlotBoundary,
    Raster,
};

/// Build the inclusion region of `boundary` over `raster`'s pixel grid.
///
/// Windows that only partially overlap the raster are truncated at the
/// raster edge. A boundary entirely outside the raster yields an empty
/// region. Pixels flagged as no-data are never included; they are
/// counted in [`ClippedRegion::nodata_pixels`] instead.
///
/// # Errors
///
/// Returns [`PipelineError::Georeference`] when a polygon boundary is
/// clipped against a raster without an invertible geotransform.
#[must_use = "returns the clipped region"]
pub fn clip(raster: &Raster, boundary: &PlotBoundary) -> Result<ClippedRegion, PipelineError> {
    match &boundary.geometry {
        BoundaryGeometry::WholeImage => Ok(clip_whole_image(raster)),
        BoundaryGeometry::Polygon(polygon) => {
            let transform = raster
                .georeference()
                .map(|g| g.transform)
                .ok_or_else(|| {
                    PipelineError::Georeference(
                        "cannot clip a polygon against a raster without georeferencing".to_string(),
                    )
                })?;
            clip_polygon(raster, &transform, polygon)
        }
    }
}

/// Fast path: the whole grid, minus no-data pixels.
fn clip_whole_image(raster: &Raster) -> ClippedRegion {
    let Dimensions { width, height } = raster.dimensions();
    let mut nodata_pixels = 0;
    let inclusion = Mask::from_fn(width, height, |x, y| {
        let valid = raster.is_valid(x, y);
        nodata_pixels += u64::from(!valid);
        valid
    });
    ClippedRegion {
        window: PixelWindow {
            x: 0,
            y: 0,
            width,
            height,
        },
        inclusion,
        nodata_pixels,
    }
}

fn clip_polygon(
    raster: &Raster,
    transform: &GeoTransform,
    polygon: &Polygon<f64>,
) -> Result<ClippedRegion, PipelineError> {
    let inverse = transform.invert().ok_or_else(|| {
        PipelineError::Georeference("raster geotransform is not invertible".to_string())
    })?;

    let Some(window) = pixel_window(&inverse, polygon, raster.dimensions()) else {
        return Ok(ClippedRegion::empty());
    };

    let mut nodata_pixels = 0;
    let inclusion = Mask::from_fn(window.width, window.height, |i, j| {
        let (x, y) = (window.x + i, window.y + j);
        if !polygon.contains(&transform.pixel_center(x, y)) {
            return false;
        }
        let valid = raster.is_valid(x, y);
        nodata_pixels += u64::from(!valid);
        valid
    });

    Ok(ClippedRegion {
        window,
        inclusion,
        nodata_pixels,
    })
}

/// Pixel-space bounding window of a polygon, clamped to the grid.
///
/// Returns `None` when the clamped window has zero area or the polygon
/// has no usable vertices.
#[must_use]
pub fn pixel_window(
    inverse: &GeoTransform,
    polygon: &Polygon<f64>,
    dimensions: Dimensions,
) -> Option<PixelWindow> {
    let mut min = (f64::INFINITY, f64::INFINITY);
    let mut max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for coord in polygon.exterior().coords() {
        let p = inverse.apply(coord.x, coord.y);
        if !(p.x.is_finite() && p.y.is_finite()) {
            return None;
        }
        min = (min.0.min(p.x), min.1.min(p.y));
        max = (max.0.max(p.x), max.1.max(p.y));
    }

    let x0 = clamp_to_grid(min.0.floor(), dimensions.width)?;
    let y0 = clamp_to_grid(min.1.floor(), dimensions.height)?;
    let x1 = clamp_to_grid(max.0.ceil(), dimensions.width)?;
    let y1 = clamp_to_grid(max.1.ceil(), dimensions.height)?;

    let window = PixelWindow {
        x: x0,
        y: y0,
        width: x1.saturating_sub(x0),
        height: y1.saturating_sub(y0),
    };
    (!window.is_empty()).then_some(window)
}

/// Clamp a whole-numbered coordinate into `[0, limit]`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_to_grid(value: f64, limit: u32) -> Option<u32> {
    if !value.is_finite() {
        return None;
    }
    Some(value.clamp(0.0, f64::from(limit)) as u32)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::georef::Georeference;
    use crate::types::{Pixels, PlotId, RgbImage, RgbaImage};
    use geo::{LineString, Rect};

    /// 10x10 raster with 1-unit pixels covering x in [0, 10], y in [0, 10].
    fn raster() -> Raster {
        Raster::new(
            Pixels::Rgb(RgbImage::new(10, 10)),
            Some(Georeference {
                transform: GeoTransform::north_up(0.0, 10.0, 1.0, 1.0),
                crs: None,
            }),
        )
    }

    fn polygon_boundary(polygon: Polygon<f64>) -> PlotBoundary {
        PlotBoundary {
            id: PlotId::Named("p".into()),
            geometry: BoundaryGeometry::Polygon(polygon),
            species: None,
        }
    }

    fn rect_boundary(min: (f64, f64), max: (f64, f64)) -> PlotBoundary {
        polygon_boundary(Rect::new(min, max).to_polygon())
    }

    #[test]
    fn whole_image_covers_every_pixel() {
        let region = clip(&raster(), &PlotBoundary::whole_image()).unwrap();
        assert_eq!(region.window.pixel_count(), 100);
        assert_eq!(region.inclusion.count_foreground(), 100);
        assert_eq!(region.nodata_pixels, 0);
    }

    #[test]
    fn whole_image_needs_no_georeference() {
        let raster = Raster::new(Pixels::Rgb(RgbImage::new(3, 2)), None);
        let region = clip(&raster, &PlotBoundary::whole_image()).unwrap();
        assert_eq!(region.inclusion.count_foreground(), 6);
    }

    #[test]
    fn whole_image_excludes_nodata_pixels() {
        let img = RgbaImage::from_fn(4, 4, |x, _| image::Rgba([0, 0, 0, if x == 0 { 0 } else { 255 }]));
        let raster = Raster::new(Pixels::Rgba(img), None);
        let region = clip(&raster, &PlotBoundary::whole_image()).unwrap();
        assert_eq!(region.inclusion.count_foreground(), 12);
        assert_eq!(region.nodata_pixels, 4);
    }

    #[test]
    fn axis_aligned_rectangle_selects_exact_window() {
        // x in [2, 5], y in [3, 7] -> columns 2..5, rows 3..7.
        let region = clip(&raster(), &rect_boundary((2.0, 3.0), (5.0, 7.0))).unwrap();
        assert_eq!(
            region.window,
            PixelWindow {
                x: 2,
                y: 3,
                width: 3,
                height: 4
            }
        );
        assert_eq!(region.inclusion.count_foreground(), 12);
    }

    #[test]
    fn partial_overlap_is_truncated_at_raster_edge() {
        let region = clip(&raster(), &rect_boundary((8.0, 8.0), (15.0, 15.0))).unwrap();
        assert_eq!(
            region.window,
            PixelWindow {
                x: 8,
                y: 0,
                width: 2,
                height: 2
            }
        );
        assert_eq!(region.inclusion.count_foreground(), 4);
    }

    #[test]
    fn boundary_outside_raster_is_empty() {
        let region = clip(&raster(), &rect_boundary((20.0, 20.0), (30.0, 30.0))).unwrap();
        assert!(region.is_empty());
        assert_eq!(region.inclusion.count_foreground(), 0);
    }

    #[test]
    fn triangle_includes_only_interior_centres() {
        // Right triangle with legs along the raster's bottom and left
        // edges: centre (i + 0.5, j + 0.5) is inside iff i + j + 1 < 4.
        let triangle = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (0.0, 4.0)]),
            vec![],
        );
        let region = clip(&raster(), &polygon_boundary(triangle)).unwrap();
        assert_eq!(region.window.pixel_count(), 16);
        assert_eq!(region.inclusion.count_foreground(), 6);
    }

    #[test]
    fn interior_ring_is_excluded() {
        let polygon = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (6.0, 0.0), (6.0, 6.0), (0.0, 6.0)]),
            vec![LineString::from(vec![
                (2.0, 2.0),
                (4.0, 2.0),
                (4.0, 4.0),
                (2.0, 4.0),
            ])],
        );
        let region = clip(&raster(), &polygon_boundary(polygon)).unwrap();
        assert_eq!(region.inclusion.count_foreground(), 36 - 4);
    }

    #[test]
    fn polygon_without_georeference_is_an_error() {
        let raster = Raster::new(Pixels::Rgb(RgbImage::new(3, 3)), None);
        let result = clip(&raster, &rect_boundary((0.0, 0.0), (1.0, 1.0)));
        assert!(matches!(result, Err(PipelineError::Georeference(_))));
    }

    #[test]
    fn nodata_inside_polygon_is_counted_not_included() {
        let img = RgbaImage::from_fn(10, 10, |x, _| {
            image::Rgba([0, 0, 0, if x < 3 { 0 } else { 255 }])
        });
        let raster = Raster::new(Pixels::Rgba(img), raster().georeference().copied());
        let region = clip(&raster, &rect_boundary((0.0, 0.0), (5.0, 10.0))).unwrap();
        assert_eq!(region.inclusion.count_foreground(), 20);
        assert_eq!(region.nodata_pixels, 30);
    }
}
