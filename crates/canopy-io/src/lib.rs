//! canopy-io: Filesystem boundary for canopycover.
//!
//! Finds input images, reads them lazily as pipeline sources, loads the
//! GeoJSON plot catalog, and writes the CSV outputs and result manifest.
//! Everything that touches the disk lives here; the pipeline and export
//! crates stay sans-IO.

pub mod catalog;
pub mod discover;
pub mod error;
pub mod output;
pub mod source;

pub use catalog::{load_catalog, parse_catalog};
pub use discover::{SUPPORTED_EXTENSIONS, discover_inputs, is_supported};
pub use error::IoError;
pub use output::{OutputPaths, write_diagnostics, write_outputs};
pub use source::FileSource;
