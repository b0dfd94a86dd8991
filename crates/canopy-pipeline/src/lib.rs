//! canopy-pipeline: Plant/soil segmentation and plot-level canopy cover
//! (sans-IO).
//!
//! Turns georeferenced field imagery into canopy cover percentages:
//! decode -> locate plots -> segment -> clip per plot -> reduce.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices (or any [`RasterSource`]) and returns structured records.
//! Filesystem interaction lives in `canopy-io`; output formats live in
//! `canopy-export`.
//!
//! ```rust
//! # use canopy_pipeline::{EncodedImage, Orchestrator, PipelineConfig, PipelineError, PlotCatalog};
//! # fn run(tiff: Vec<u8>) -> Result<(), PipelineError> {
//! let orchestrator = Orchestrator::new(PipelineConfig::default())?;
//! let sources = [EncodedImage::new("field.tif", tiff)];
//! let batch = orchestrator.run(&sources, &PlotCatalog::empty());
//! for record in &batch.records {
//!     println!("{} {}: {:?}", record.image, record.plot, record.cover);
//! }
//! # Ok(())
//! # }
//! ```

pub mod blur;
pub mod clip;
pub mod diagnostics;
pub mod georef;
pub mod load;
pub mod locate;
pub mod orchestrator;
pub mod pipeline;
pub mod ratio;
pub mod segment;
pub mod types;

pub use blur::SmoothingKernel;
pub use clip::clip;
pub use diagnostics::{BatchDiagnostics, Clock, NoClock};
pub use georef::{Crs, GeoTransform, Georeference};
pub use load::{EncodedImage, RasterSource, decode};
pub use locate::{CatalogPlot, PlotCatalog, locate};
pub use orchestrator::{BatchOutcome, BatchResult, Orchestrator, UnitFailure};
pub use pipeline::Pipeline;
pub use ratio::{CoverValue, RegionStats, ratio};
pub use segment::{COLOR_THRESHOLD, MASK_THRESHOLD, segment};
pub use types::{
    BoundaryGeometry, CanopyCoverRecord, ClippedRegion, Cover, Dimensions, ERROR_SENTINEL,
    ErrorKind, Mask, NO_DATA_SENTINEL, PipelineConfig, PipelineError, PixelWindow, Pixels,
    PlotBoundary, PlotId, Provenance, Raster,
};
