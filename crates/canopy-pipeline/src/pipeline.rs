//! Per-image staged pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! ```rust
//! # use canopy_pipeline::{EncodedImage, Pipeline, PipelineConfig, PipelineError, PlotCatalog};
//! # fn run(tiff: Vec<u8>) -> Result<(), PipelineError> {
//! let config = PipelineConfig::default();
//! let catalog = PlotCatalog::empty();
//! let source = EncodedImage::new("field.tif", tiff);
//! let reduced = Pipeline::new(&source, &config)
//!     .load()?
//!     .locate(&catalog)?
//!     .segment()?
//!     .reduce();
//!
//! for record in reduced.records() {
//!     println!("{}: {:?}", record.plot, record.cover);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for fallible stages), carrying the raster forward. The
//! mask is computed once per image in [`Located::segment`] and shared
//! read-only by every plot in [`Segmented::reduce`].

use geo::Centroid;

use crate::diagnostics::StageMetrics;
use crate::load::RasterSource;
use crate::locate::PlotCatalog;
use crate::orchestrator::UnitFailure;
use crate::ratio::RegionStats;
use crate::types::{
    BoundaryGeometry, CanopyCoverRecord, Cover, Mask, PipelineConfig, PipelineError, PlotBoundary,
    Raster,
};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before the source has been read.
///
/// Call [`load`](Self::load) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .load() to continue"]
pub struct Pending<'a, S: ?Sized> {
    config: &'a PipelineConfig,
    source: &'a S,
}

impl<'a, S: RasterSource + ?Sized> Pending<'a, S> {
    /// Identifier of the source image.
    #[must_use]
    pub fn image(&self) -> &str {
        self.source.id()
    }

    /// Decode the source and advance to the [`Loaded`] stage.
    ///
    /// # Errors
    ///
    /// Returns whatever [`RasterSource::load`] returns when the source
    /// cannot be read or decoded.
    pub fn load(self) -> Result<Loaded<'a>, PipelineError> {
        let raster = self.source.load()?;
        tracing::debug!(
            image = self.source.id(),
            width = raster.dimensions().width,
            height = raster.dimensions().height,
            channels = raster.channel_count(),
            georeferenced = raster.georeference().is_some(),
            "image loaded"
        );
        Ok(Loaded {
            config: self.config,
            image: self.source.id().to_string(),
            raster,
        })
    }
}

// ───────────────────────── Stage 1: Loaded ───────────────────────────

/// Pipeline state after decoding the source raster.
///
/// Call [`locate`](Self::locate) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .locate() to continue"]
pub struct Loaded<'a> {
    config: &'a PipelineConfig,
    image: String,
    raster: Raster,
}

impl<'a> Loaded<'a> {
    /// Identifier of the source image.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// The decoded raster.
    #[must_use]
    pub const fn raster(&self) -> &Raster {
        &self.raster
    }

    /// Metrics describing the decoded raster.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        let dimensions = self.raster.dimensions();
        StageMetrics::Load {
            width: dimensions.width,
            height: dimensions.height,
            channels: self.raster.channel_count(),
            georeferenced: self.raster.georeference().is_some(),
            epsg: self
                .raster
                .georeference()
                .and_then(|g| g.crs)
                .map(crate::georef::Crs::code),
        }
    }

    /// Find the plots covered by the raster and advance to [`Located`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Georeference`] under the conditions
    /// documented on [`locate`](crate::locate::locate).
    pub fn locate(self, catalog: &PlotCatalog) -> Result<Located<'a>, PipelineError> {
        let plots = crate::locate::locate(&self.raster, catalog)?;
        tracing::debug!(image = %self.image, plots = plots.len(), "plots located");
        Ok(Located {
            config: self.config,
            image: self.image,
            raster: self.raster,
            plots,
        })
    }
}

// ───────────────────────── Stage 2: Located ──────────────────────────

/// Pipeline state after plot location.
///
/// Call [`segment`](Self::segment) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .segment() to continue"]
pub struct Located<'a> {
    config: &'a PipelineConfig,
    image: String,
    raster: Raster,
    plots: Vec<PlotBoundary>,
}

impl<'a> Located<'a> {
    /// Plot boundaries that apply to this image, in catalog order.
    #[must_use]
    pub fn plots(&self) -> &[PlotBoundary] {
        &self.plots
    }

    /// The decoded raster.
    #[must_use]
    pub const fn raster(&self) -> &Raster {
        &self.raster
    }

    /// Metrics describing the located plots.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        StageMetrics::Locate {
            plot_count: self.plots.len(),
            whole_image: self.plots.iter().any(PlotBoundary::is_whole_image),
        }
    }

    /// Segment the raster into a plant/soil mask and advance to
    /// [`Segmented`]. Pre-masked rasters pass through unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRaster`] if the raster has a
    /// single non-binary channel.
    pub fn segment(self) -> Result<Segmented<'a>, PipelineError> {
        let passthrough = self.raster.is_masked();
        let mask = crate::segment::segment(&self.raster, self.config.smoothing)?;
        tracing::debug!(
            image = %self.image,
            passthrough,
            plant_pixels = mask.count_foreground(),
            "segmented"
        );
        Ok(Segmented {
            config: self.config,
            image: self.image,
            raster: self.raster,
            plots: self.plots,
            mask,
            passthrough,
        })
    }
}

// ───────────────────────── Stage 3: Segmented ────────────────────────

/// Pipeline state after segmentation.
///
/// Call [`reduce`](Self::reduce) to clip and reduce every plot.
#[must_use = "pipeline stages are consumed by advancing; call .reduce() to continue"]
pub struct Segmented<'a> {
    config: &'a PipelineConfig,
    image: String,
    raster: Raster,
    plots: Vec<PlotBoundary>,
    mask: Mask,
    passthrough: bool,
}

impl Segmented<'_> {
    /// The plant/soil mask covering the whole raster.
    #[must_use]
    pub const fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Whether the raster was already a mask.
    #[must_use]
    pub const fn passthrough(&self) -> bool {
        self.passthrough
    }

    /// Metrics describing the mask.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        StageMetrics::Segment {
            passthrough: self.passthrough,
            foreground_pixels: self.mask.count_foreground(),
            pixel_count: self.mask.dimensions().pixel_count(),
        }
    }

    /// Clip and reduce every plot, producing one record per plot.
    ///
    /// A plot whose clip fails yields a [`Cover::Failed`] record and a
    /// matching [`UnitFailure`]; the remaining plots are unaffected.
    pub fn reduce(self) -> Reduced {
        let mut records = Vec::with_capacity(self.plots.len());
        let mut stats = Vec::with_capacity(self.plots.len());
        let mut failures = Vec::new();

        for plot in &self.plots {
            let outcome = crate::clip::clip(&self.raster, plot)
                .map(|region| crate::ratio::region_stats(&self.mask, &region));
            let cover = match outcome {
                Ok(region_stats) => {
                    stats.push(Some(region_stats));
                    Cover::from(region_stats.cover(self.config.max_nodata_fraction))
                }
                Err(err) => {
                    tracing::warn!(image = %self.image, plot = %plot.id, error = %err, "plot failed");
                    stats.push(None);
                    failures.push(UnitFailure::for_plot(&self.image, plot.id.clone(), &err));
                    Cover::Failed
                }
            };
            records.push(self.record(plot, cover));
        }

        Reduced {
            image: self.image,
            records,
            stats,
            failures,
        }
    }

    fn record(&self, plot: &PlotBoundary, cover: Cover) -> CanopyCoverRecord {
        let centroid = match &plot.geometry {
            BoundaryGeometry::Polygon(polygon) => polygon.centroid().map(|p| (p.x(), p.y())),
            BoundaryGeometry::WholeImage => self.raster.bounds().map(|b| {
                let c = b.center();
                (c.x, c.y)
            }),
        };
        let provenance = self.config.provenance.clone();
        CanopyCoverRecord {
            image: self.image.clone(),
            plot: plot.id.clone(),
            cover,
            centroid,
            species: plot
                .species
                .clone()
                .unwrap_or_else(|| provenance.species.clone()),
            provenance,
        }
    }
}

// ───────────────────────── Stage 4: Reduced ──────────────────────────

/// Final per-image state: one record per located plot.
#[must_use = "call .into_parts() to extract records and failures"]
pub struct Reduced {
    image: String,
    records: Vec<CanopyCoverRecord>,
    stats: Vec<Option<RegionStats>>,
    failures: Vec<UnitFailure>,
}

impl Reduced {
    /// Identifier of the source image.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Records in plot order.
    #[must_use]
    pub fn records(&self) -> &[CanopyCoverRecord] {
        &self.records
    }

    /// Pixel counts per record (`None` where the plot failed).
    #[must_use]
    pub fn stats(&self) -> &[Option<RegionStats>] {
        &self.stats
    }

    /// Plot-level failures.
    #[must_use]
    pub fn failures(&self) -> &[UnitFailure] {
        &self.failures
    }

    /// Metrics describing the reduction.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        let count = |wanted: fn(&Cover) -> bool| {
            self.records.iter().filter(|r| wanted(&r.cover)).count()
        };
        StageMetrics::Reduce {
            plot_count: self.records.len(),
            percent_count: count(|c| matches!(c, Cover::Percent(_))),
            nodata_count: count(|c| matches!(c, Cover::NoData)),
            failed_count: count(|c| matches!(c, Cover::Failed)),
        }
    }

    /// Consume the pipeline and return its records and failures.
    #[must_use]
    pub fn into_parts(self) -> (Vec<CanopyCoverRecord>, Vec<UnitFailure>) {
        (self.records, self.failures)
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental per-image pipeline.
///
/// Created via [`Pipeline::new`], which borrows the source and config
/// without doing any processing. Each stage method consumes the current
/// state and returns the next, making it a compile-time error to skip
/// stages or call them out of order.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline for one source.
    ///
    /// No processing is performed. Call [`.load()`](Pending::load) to
    /// begin.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new<'a, S: RasterSource + ?Sized>(
        source: &'a S,
        config: &'a PipelineConfig,
    ) -> Pending<'a, S> {
        Pending { config, source }
    }
}
