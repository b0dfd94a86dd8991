//! File-backed raster sources.

use std::path::{Path, PathBuf};

use canopy_pipeline::{PipelineError, Raster, RasterSource, decode};

/// An image file, read and decoded when the orchestrator asks for it.
///
/// Reading is deferred so a batch only holds the images currently being
/// processed.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    id: String,
}

impl FileSource {
    /// Source for the file at `path`; its display form is the record id.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path.display().to_string();
        Self { path, id }
    }

    /// Path of the image file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RasterSource for FileSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(&self) -> Result<Raster, PipelineError> {
        let bytes = std::fs::read(&self.path).map_err(|err| {
            PipelineError::InvalidRaster(format!("failed to read {}: {err}", self.id))
        })?;
        decode(&bytes)
    }
}
