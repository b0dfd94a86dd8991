//! Shared types for the canopy cover pipeline.

use std::fmt;

use geo::{Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::blur::SmoothingKernel;
use crate::georef::Georeference;

/// Re-export `GrayImage` so downstream crates can build masks and
/// single-channel rasters without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` for three-channel imagery.
pub use image::RgbImage;

/// Re-export `RgbaImage` for imagery carrying a no-data alpha channel.
pub use image::RgbaImage;

/// Re-export `GrayAlphaImage` for single-band imagery with alpha.
pub use image::GrayAlphaImage;

/// Mask value marking plant (foreground) pixels.
pub const FOREGROUND: u8 = 255;

/// Mask value marking soil (background) pixels.
pub const BACKGROUND: u8 = 0;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total number of pixels.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

// ───────────────────────────── Mask ──────────────────────────────────

/// A binary plant/soil grid.
///
/// Backed by a `GrayImage` whose samples are only ever [`FOREGROUND`]
/// or [`BACKGROUND`], so it can be inspected with ordinary image tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask(GrayImage);

impl Mask {
    /// Build a mask by evaluating `f` at every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        Self(GrayImage::from_fn(width, height, |x, y| {
            image::Luma([if f(x, y) { FOREGROUND } else { BACKGROUND }])
        }))
    }

    /// A mask with every pixel set to `value`.
    #[must_use]
    pub fn filled(dimensions: Dimensions, value: bool) -> Self {
        let sample = if value { FOREGROUND } else { BACKGROUND };
        Self(GrayImage::from_pixel(
            dimensions.width,
            dimensions.height,
            image::Luma([sample]),
        ))
    }

    /// Interpret a single-channel image as an already-segmented mask.
    ///
    /// Accepts images whose samples are all in `{0, 255}` or all in
    /// `{0, 1}`; the latter is rescaled to `{0, 255}`. Returns `None`
    /// for anything else (including a mix of `1` and `255`).
    #[must_use]
    pub fn from_binary_image(mut image: GrayImage) -> Option<Self> {
        let mut saw_one = false;
        let mut saw_full = false;
        for &sample in image.as_raw() {
            match sample {
                BACKGROUND => {}
                1 => saw_one = true,
                FOREGROUND => saw_full = true,
                _ => return None,
            }
        }
        if saw_one && saw_full {
            return None;
        }
        if saw_one {
            for sample in image.iter_mut() {
                *sample *= FOREGROUND;
            }
        }
        Some(Self(image))
    }

    /// Wrap a thresholded image the caller guarantees is `{0, 255}`.
    pub(crate) const fn from_thresholded(image: GrayImage) -> Self {
        Self(image)
    }

    /// Mask dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.0.width(),
            height: self.0.height(),
        }
    }

    /// Whether the pixel at `(x, y)` is foreground. Out-of-bounds
    /// coordinates read as background.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.0
            .get_pixel_checked(x, y)
            .is_some_and(|p| p.0[0] == FOREGROUND)
    }

    /// Number of foreground pixels.
    #[must_use]
    pub fn count_foreground(&self) -> u64 {
        self.0
            .as_raw()
            .iter()
            .map(|&s| u64::from(s == FOREGROUND))
            .sum()
    }

    /// The backing `{0, 255}` image.
    #[must_use]
    pub const fn as_image(&self) -> &GrayImage {
        &self.0
    }

    /// Consume the mask and return the backing image.
    #[must_use]
    pub fn into_image(self) -> GrayImage {
        self.0
    }
}

// ───────────────────────────── Raster ────────────────────────────────

/// Pixel payload of a [`Raster`], tagged by channel layout.
///
/// Channel order is fixed: channel 0 is red, channel 1 is green.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pixels {
    /// Three-channel imagery requiring segmentation.
    Rgb(RgbImage),
    /// Four-channel imagery; alpha `0` marks no-data pixels.
    Rgba(RgbaImage),
    /// A single channel that is not a binary mask. Cannot be segmented.
    Gray(GrayImage),
    /// A pre-segmented binary mask; segmentation is a pass-through.
    Mask(Mask),
    /// A pre-segmented binary mask read from a band with alpha.
    MaskWithNoData {
        /// Plant/soil classification. No-data pixels read as soil.
        mask: Mask,
        /// Foreground wherever the pixel carries data (alpha non-zero).
        valid: Mask,
    },
}

/// A decoded image plus its georeferencing.
///
/// Immutable once built: every stage borrows it read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pixels: Pixels,
    georeference: Option<Georeference>,
}

impl Raster {
    /// Create a raster from already-classified pixels.
    #[must_use]
    pub const fn new(pixels: Pixels, georeference: Option<Georeference>) -> Self {
        Self {
            pixels,
            georeference,
        }
    }

    /// Create a raster from a single channel, classifying it as a
    /// [`Pixels::Mask`] when it is binary and [`Pixels::Gray`] otherwise.
    #[must_use]
    pub fn from_single_channel(image: GrayImage, georeference: Option<Georeference>) -> Self {
        let pixels = if let Some(mask) = Mask::from_binary_image(image.clone()) {
            Pixels::Mask(mask)
        } else {
            Pixels::Gray(image)
        };
        Self::new(pixels, georeference)
    }

    /// Create a raster from a single band plus alpha.
    ///
    /// Alpha `0` marks no-data. A fully opaque image is classified like
    /// [`from_single_channel`](Self::from_single_channel). Otherwise the
    /// band becomes [`Pixels::MaskWithNoData`] when its data pixels are
    /// binary and [`Pixels::Gray`] when they are not.
    #[must_use]
    pub fn from_gray_alpha(image: &GrayAlphaImage, georeference: Option<Georeference>) -> Self {
        let (width, height) = image.dimensions();
        let valid = Mask::from_fn(width, height, |x, y| image.get_pixel(x, y).0[1] != 0);
        let band = GrayImage::from_fn(width, height, |x, y| {
            let [luma, alpha] = image.get_pixel(x, y).0;
            image::Luma([if alpha == 0 { BACKGROUND } else { luma }])
        });

        if valid.count_foreground() == valid.dimensions().pixel_count() {
            return Self::from_single_channel(band, georeference);
        }
        let pixels = match Mask::from_binary_image(band.clone()) {
            Some(mask) => Pixels::MaskWithNoData { mask, valid },
            None => Pixels::Gray(band),
        };
        Self::new(pixels, georeference)
    }

    /// Return the same pixels with different georeferencing.
    #[must_use]
    pub fn with_georeference(self, georeference: Option<Georeference>) -> Self {
        Self {
            georeference,
            ..self
        }
    }

    /// The pixel payload.
    #[must_use]
    pub const fn pixels(&self) -> &Pixels {
        &self.pixels
    }

    /// Georeferencing, if the source carried any.
    #[must_use]
    pub const fn georeference(&self) -> Option<&Georeference> {
        self.georeference.as_ref()
    }

    /// Raster dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        let (width, height) = match &self.pixels {
            Pixels::Rgb(img) => img.dimensions(),
            Pixels::Rgba(img) => img.dimensions(),
            Pixels::Gray(img) => img.dimensions(),
            Pixels::Mask(mask) | Pixels::MaskWithNoData { mask, .. } => {
                return mask.dimensions();
            }
        };
        Dimensions { width, height }
    }

    /// Number of channels in the pixel payload.
    #[must_use]
    pub const fn channel_count(&self) -> u8 {
        match self.pixels {
            Pixels::Rgb(_) => 3,
            Pixels::Rgba(_) => 4,
            Pixels::Gray(_) | Pixels::Mask(_) => 1,
            Pixels::MaskWithNoData { .. } => 2,
        }
    }

    /// Whether the raster is already a binary mask.
    #[must_use]
    pub const fn is_masked(&self) -> bool {
        matches!(
            self.pixels,
            Pixels::Mask(_) | Pixels::MaskWithNoData { .. }
        )
    }

    /// Whether the pixel at `(x, y)` carries data. Only rasters read
    /// with an alpha channel have no-data pixels (alpha `0`).
    #[must_use]
    pub fn is_valid(&self, x: u32, y: u32) -> bool {
        match &self.pixels {
            Pixels::Rgba(img) => img.get_pixel_checked(x, y).is_some_and(|p| p.0[3] != 0),
            Pixels::MaskWithNoData { valid, .. } => valid.get(x, y),
            _ => true,
        }
    }

    /// Geographic envelope of the raster, when georeferenced.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.georeference
            .map(|g| g.transform.bounds(self.dimensions()))
    }
}

impl From<Mask> for Raster {
    fn from(mask: Mask) -> Self {
        Self::new(Pixels::Mask(mask), None)
    }
}

// ──────────────────────────── Plots ──────────────────────────────────

/// Identifier of the plot a measurement belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotId {
    /// The synthetic plot covering an entire image.
    WholeImage,
    /// A named plot from the boundary catalog.
    Named(String),
}

impl PlotId {
    /// Display label used for the whole-image plot.
    pub const WHOLE_IMAGE_LABEL: &'static str = "whole_image";
}

impl fmt::Display for PlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WholeImage => f.write_str(Self::WHOLE_IMAGE_LABEL),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Geometry delimiting a plot.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryGeometry {
    /// The full raster extent. Clipping takes a fast path.
    WholeImage,
    /// A closed polygon in the raster's CRS. Interior rings are holes.
    Polygon(Polygon<f64>),
}

/// A plot identifier plus its boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotBoundary {
    /// Plot identifier.
    pub id: PlotId,
    /// Plot geometry.
    pub geometry: BoundaryGeometry,
    /// Species or germplasm planted in the plot, when the catalog knows it.
    pub species: Option<String>,
}

impl PlotBoundary {
    /// The synthetic boundary covering an entire raster.
    #[must_use]
    pub const fn whole_image() -> Self {
        Self {
            id: PlotId::WholeImage,
            geometry: BoundaryGeometry::WholeImage,
            species: None,
        }
    }

    /// Whether this is the synthetic whole-image boundary.
    #[must_use]
    pub const fn is_whole_image(&self) -> bool {
        matches!(self.geometry, BoundaryGeometry::WholeImage)
    }
}

/// Rectangular pixel window `[x, x + width) x [y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelWindow {
    /// Leftmost column.
    pub x: u32,
    /// Topmost row.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelWindow {
    /// Whether the window covers no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels in the window.
    #[must_use]
    pub const fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Pixels of a raster lying inside one plot boundary.
///
/// `inclusion` has the window's dimensions; pixel `(i, j)` of the
/// inclusion mask corresponds to raster pixel `(window.x + i, window.y + j)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClippedRegion {
    /// Bounding window of the boundary within the raster grid.
    pub window: PixelWindow,
    /// Pixels inside the boundary that carry data.
    pub inclusion: Mask,
    /// Pixels inside the boundary whose alpha marks them as no-data.
    pub nodata_pixels: u64,
}

impl ClippedRegion {
    /// A region with no pixels at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            window: PixelWindow {
                x: 0,
                y: 0,
                width: 0,
                height: 0,
            },
            inclusion: Mask::filled(
                Dimensions {
                    width: 0,
                    height: 0,
                },
                false,
            ),
            nodata_pixels: 0,
        }
    }

    /// Whether the region covers no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

// ──────────────────────────── Records ────────────────────────────────

/// Value written to numeric outputs for a region with no usable pixels.
pub const NO_DATA_SENTINEL: f64 = -1.0;

/// Value written to numeric outputs for a plot whose computation failed.
pub const ERROR_SENTINEL: f64 = -9999.0;

/// Outcome of one (image, plot) unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Cover {
    /// Canopy cover as a percentage in `[0.0, 100.0]`.
    Percent(f64),
    /// The region had no usable pixels.
    NoData,
    /// The computation failed; see the batch failure list.
    Failed,
}

impl Cover {
    /// The percentage, or `None` for sentinel outcomes.
    #[must_use]
    pub const fn percent(self) -> Option<f64> {
        match self {
            Self::Percent(p) => Some(p),
            Self::NoData | Self::Failed => None,
        }
    }

    /// Numeric value with sentinels substituted for non-measurements.
    #[must_use]
    pub const fn as_value(self) -> f64 {
        match self {
            Self::Percent(p) => p,
            Self::NoData => NO_DATA_SENTINEL,
            Self::Failed => ERROR_SENTINEL,
        }
    }
}

/// Citation and provenance fields stamped onto every record.
///
/// Opaque strings: the pipeline passes them through unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Provenance {
    /// Citation author.
    pub citation_author: String,
    /// Citation title.
    pub citation_title: String,
    /// Citation year; serializers fall back to the timestamp's year.
    pub citation_year: Option<String>,
    /// Species or germplasm name used when the plot catalog has none.
    pub species: String,
    /// Measurement method description.
    pub method: String,
    /// Trait database access level.
    pub access_level: String,
    /// Capture timestamp (ISO 8601).
    pub timestamp: Option<String>,
}

impl Provenance {
    /// Placeholder for unknown citation and species fields.
    pub const UNKNOWN: &'static str = "Unknown";
    /// Default measurement method.
    pub const DEFAULT_METHOD: &'static str =
        "Green Canopy Cover Estimation from Field Scanner RGB images";
    /// Default trait database access level.
    pub const DEFAULT_ACCESS_LEVEL: &'static str = "2";
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            citation_author: Self::UNKNOWN.to_string(),
            citation_title: Self::UNKNOWN.to_string(),
            citation_year: None,
            species: Self::UNKNOWN.to_string(),
            method: Self::DEFAULT_METHOD.to_string(),
            access_level: Self::DEFAULT_ACCESS_LEVEL.to_string(),
            timestamp: None,
        }
    }
}

/// One canopy cover measurement for an (image, plot) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanopyCoverRecord {
    /// Identifier of the source image.
    pub image: String,
    /// Plot the measurement belongs to.
    pub plot: PlotId,
    /// Measured cover or sentinel.
    pub cover: Cover,
    /// Plot centroid `(x, y)` in the raster's CRS, when known.
    pub centroid: Option<(f64, f64)>,
    /// Species for this plot (catalog value, else provenance default).
    pub species: String,
    /// Citation and provenance fields.
    pub provenance: Provenance,
}

// ───────────────────────────── Config ────────────────────────────────

/// Configuration for a pipeline run.
///
/// Constructed once and passed to the
/// [`Orchestrator`](crate::Orchestrator); never mutated afterwards.
/// The segmentation thresholds are fixed constants in
/// [`segment`](crate::segment) and are deliberately not configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Smoothing kernel applied between the two thresholds.
    pub smoothing: SmoothingKernel,

    /// Largest share of no-data pixels a region may have before its
    /// cover is reported as no-data.
    pub max_nodata_fraction: f64,

    /// Citation and provenance fields stamped onto records.
    pub provenance: Provenance,
}

impl PipelineConfig {
    /// Default box blur radius (a 3x3 kernel).
    pub const DEFAULT_BLUR_RADIUS: u32 = 1;

    /// Default no-data tolerance.
    pub const DEFAULT_MAX_NODATA_FRACTION: f64 = 0.75;

    /// Largest accepted box blur radius.
    pub const MAX_BLUR_RADIUS: u32 = 64;

    /// Largest accepted Gaussian sigma.
    pub const MAX_GAUSSIAN_SIGMA: f32 = 64.0;

    /// Check invariants the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] when the box radius
    /// exceeds [`MAX_BLUR_RADIUS`](Self::MAX_BLUR_RADIUS), when the
    /// Gaussian sigma is not within `[0, MAX_GAUSSIAN_SIGMA]`, or when
    /// `max_nodata_fraction` lies outside `[0.0, 1.0]`.
    pub fn validate(&self) -> Result<(), PipelineError> {
        match self.smoothing {
            SmoothingKernel::Box { radius } if radius > Self::MAX_BLUR_RADIUS => {
                return Err(PipelineError::InvalidConfig(format!(
                    "box blur radius must be at most {}, got {radius}",
                    Self::MAX_BLUR_RADIUS
                )));
            }
            SmoothingKernel::Gaussian { sigma }
                if !(0.0..=Self::MAX_GAUSSIAN_SIGMA).contains(&sigma) =>
            {
                return Err(PipelineError::InvalidConfig(format!(
                    "gaussian sigma must be within [0, {}], got {sigma}",
                    Self::MAX_GAUSSIAN_SIGMA
                )));
            }
            _ => {}
        }
        if !(0.0..=1.0).contains(&self.max_nodata_fraction) {
            return Err(PipelineError::InvalidConfig(format!(
                "max_nodata_fraction must be within [0, 1], got {}",
                self.max_nodata_fraction
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            smoothing: SmoothingKernel::Box {
                radius: Self::DEFAULT_BLUR_RADIUS,
            },
            max_nodata_fraction: Self::DEFAULT_MAX_NODATA_FRACTION,
            provenance: Provenance::default(),
        }
    }
}

// ───────────────────────────── Errors ────────────────────────────────

/// Errors that can occur during pipeline processing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// A non-TIFF image could not be decoded.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// A TIFF image could not be decoded.
    #[error("failed to decode TIFF: {0}")]
    TiffDecode(#[from] tiff::TiffError),

    /// The raster content is unusable (missing channels, bad layout).
    #[error("invalid raster: {0}")]
    InvalidRaster(String),

    /// Georeferencing is missing or incompatible with the plot catalog.
    #[error("georeference error: {0}")]
    Georeference(String),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Collapse into the coarse error taxonomy reported per unit.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput
            | Self::ImageDecode(_)
            | Self::TiffDecode(_)
            | Self::InvalidRaster(_) => ErrorKind::InvalidRaster,
            Self::Georeference(_) => ErrorKind::Georeference,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

/// Coarse error taxonomy recorded against failed units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or unreadable raster content.
    InvalidRaster,
    /// Missing or incompatible georeferencing.
    Georeference,
    /// Invalid configuration.
    InvalidConfig,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidRaster => "invalid_raster",
            Self::Georeference => "georeference",
            Self::InvalidConfig => "invalid_config",
        })
    }
}
