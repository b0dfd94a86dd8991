//! Georeferencing: affine pixel/geographic transforms and CRS identifiers.
//!
//! [`GeoTransform`] follows the six-coefficient GDAL ordering:
//!
//! ```text
//! x_geo = origin_x + col * pixel_width  + row * row_rotation
//! y_geo = origin_y + col * column_rotation + row * pixel_height
//! ```
//!
//! Pixel coordinates address pixel *corners*; the centre of pixel
//! `(col, row)` is `(col + 0.5, row + 0.5)`.

use std::fmt;

use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

use crate::types::Dimensions;

/// Affine mapping between pixel space and geographic space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// Geographic x of the top-left pixel corner.
    pub origin_x: f64,
    /// Geographic x advance per column.
    pub pixel_width: f64,
    /// Geographic x advance per row (zero for north-up images).
    pub row_rotation: f64,
    /// Geographic y of the top-left pixel corner.
    pub origin_y: f64,
    /// Geographic y advance per column (zero for north-up images).
    pub column_rotation: f64,
    /// Geographic y advance per row (negative for north-up images).
    pub pixel_height: f64,
}

impl GeoTransform {
    /// A north-up transform with square-or-rectangular pixels.
    #[must_use]
    pub const fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            column_rotation: 0.0,
            pixel_height: -pixel_height,
        }
    }

    /// Build from a GeoTIFF `ModelTiepointTag` and `ModelPixelScaleTag`.
    ///
    /// The tiepoint is `[i, j, k, x, y, z]` (raster point, model point)
    /// and the scale is `[sx, sy, sz]`. Raster rows grow southwards, so
    /// the y scale is negated.
    #[must_use]
    pub fn from_tiepoint_and_scale(tiepoint: &[f64], scale: &[f64]) -> Option<Self> {
        let (&[i, j, _, x, y, ..], &[sx, sy, ..]) = (tiepoint, scale) else {
            return None;
        };
        Some(Self {
            origin_x: i.mul_add(-sx, x),
            pixel_width: sx,
            row_rotation: 0.0,
            origin_y: j.mul_add(sy, y),
            column_rotation: 0.0,
            pixel_height: -sy,
        })
    }

    /// Build from a GeoTIFF `ModelTransformationTag` (row-major 4x4 matrix).
    #[must_use]
    pub fn from_model_transformation(matrix: &[f64]) -> Option<Self> {
        if matrix.len() < 16 {
            return None;
        }
        Some(Self {
            origin_x: matrix[3],
            pixel_width: matrix[0],
            row_rotation: matrix[1],
            origin_y: matrix[7],
            column_rotation: matrix[4],
            pixel_height: matrix[5],
        })
    }

    /// Map a pixel-space coordinate to geographic space.
    #[must_use]
    pub fn apply(&self, col: f64, row: f64) -> Coord<f64> {
        Coord {
            x: row.mul_add(self.row_rotation, col.mul_add(self.pixel_width, self.origin_x)),
            y: row.mul_add(self.pixel_height, col.mul_add(self.column_rotation, self.origin_y)),
        }
    }

    /// The geographic coordinate of the centre of pixel `(col, row)`.
    #[must_use]
    pub fn pixel_center(&self, col: u32, row: u32) -> Coord<f64> {
        self.apply(f64::from(col) + 0.5, f64::from(row) + 0.5)
    }

    /// The inverse transform (geographic to pixel space).
    ///
    /// Returns `None` when the transform is singular or has non-finite
    /// coefficients.
    #[must_use]
    pub fn invert(&self) -> Option<Self> {
        let det = self
            .pixel_width
            .mul_add(self.pixel_height, -(self.row_rotation * self.column_rotation));
        if det == 0.0 || !det.is_finite() || !self.origin_x.is_finite() || !self.origin_y.is_finite()
        {
            return None;
        }
        Some(Self {
            origin_x: self
                .row_rotation
                .mul_add(self.origin_y, -(self.origin_x * self.pixel_height))
                / det,
            pixel_width: self.pixel_height / det,
            row_rotation: -self.row_rotation / det,
            origin_y: self
                .origin_x
                .mul_add(self.column_rotation, -(self.pixel_width * self.origin_y))
                / det,
            column_rotation: -self.column_rotation / det,
            pixel_height: self.pixel_width / det,
        })
    }

    /// Axis-aligned geographic envelope of a pixel grid.
    #[must_use]
    pub fn bounds(&self, dimensions: Dimensions) -> Rect<f64> {
        let w = f64::from(dimensions.width);
        let h = f64::from(dimensions.height);
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(w, 0.0),
            self.apply(0.0, h),
            self.apply(w, h),
        ];
        let (mut min, mut max) = (corners[0], corners[0]);
        for c in &corners[1..] {
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
        }
        Rect::new(min, max)
    }
}

/// A coordinate reference system, identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs(u32);

impl Crs {
    /// Wrap an EPSG code.
    #[must_use]
    pub const fn epsg(code: u32) -> Self {
        Self(code)
    }

    /// The EPSG code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self.0
    }

    /// Parse `EPSG:32612`, `epsg:32612` or `urn:ogc:def:crs:EPSG::32612`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let code = upper
            .strip_prefix("URN:OGC:DEF:CRS:EPSG:")
            .or_else(|| upper.strip_prefix("EPSG:"))?;
        // The URN form may carry an empty version component (`EPSG::code`).
        let code = code.rsplit(':').next()?;
        code.parse().ok().filter(|&c| c > 0).map(Self)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

/// Geotransform plus optional CRS attached to a raster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Georeference {
    /// Pixel to geographic mapping.
    pub transform: GeoTransform,
    /// Coordinate reference system, when the source declared one.
    pub crs: Option<Crs>,
}
