//! I/O error type.

use std::path::PathBuf;

/// Errors raised at the filesystem boundary.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// An input path does not exist.
    #[error("input not found: {}", .0.display())]
    MissingInput(PathBuf),

    /// No supported image was found among the inputs.
    #[error("no supported images found (expected .tif, .tiff, .png, .jpg or .jpeg)")]
    NoInputs,

    /// Reading a file or directory failed.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Writing a file or creating a directory failed.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The plot catalog is not valid GeoJSON.
    #[error("invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The plot catalog is valid GeoJSON but not a usable catalog.
    #[error("invalid plot catalog: {0}")]
    Catalog(String),

    /// Serializing an output failed.
    #[error(transparent)]
    Export(#[from] canopy_export::ExportError),

    /// Serializing diagnostics failed.
    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}
