//! Output files.
//!
//! A run writes two CSV files and a `result.json` manifest into the
//! working space. The CSV files are written even when the run failed so
//! their headers are always present; the manifest only lists them on
//! success.

use std::path::{Path, PathBuf};

use tracing::info;

use canopy_export::{
    ManifestFile, ResultManifest, TraitsOptions, to_geostreams_csv, to_traits_csv,
};
use canopy_pipeline::{BatchDiagnostics, BatchResult};

use crate::error::IoError;

/// Trait-database CSV file name.
pub const TRAITS_FILE: &str = "canopycover.csv";
/// Geostreams CSV file name.
pub const GEOSTREAMS_FILE: &str = "canopycover_geostreams.csv";
/// Result manifest file name.
pub const MANIFEST_FILE: &str = "result.json";
/// Diagnostics file name.
pub const DIAGNOSTICS_FILE: &str = "diagnostics.json";

/// Locations of the files written for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// Trait-database CSV.
    pub traits: PathBuf,
    /// Geostreams CSV.
    pub geostreams: PathBuf,
    /// Result manifest.
    pub manifest: PathBuf,
}

impl OutputPaths {
    /// Output locations inside `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            traits: dir.join(TRAITS_FILE),
            geostreams: dir.join(GEOSTREAMS_FILE),
            manifest: dir.join(MANIFEST_FILE),
        }
    }
}

/// Write the CSV outputs and the result manifest for `batch` into `dir`.
///
/// `dir` is created if missing. Returns the manifest that was written.
///
/// # Errors
///
/// Returns [`IoError::Write`] if a file or the directory cannot be
/// written, or [`IoError::Export`] if serialization fails.
pub fn write_outputs(
    dir: &Path,
    batch: &BatchResult,
    options: TraitsOptions,
) -> Result<ResultManifest, IoError> {
    create_dir(dir)?;
    let paths = OutputPaths::in_dir(dir);

    write_file(&paths.traits, &to_traits_csv(&batch.records, options)?)?;
    write_file(&paths.geostreams, &to_geostreams_csv(&batch.records)?)?;

    let files = [&paths.geostreams, &paths.traits]
        .into_iter()
        .map(|path| ManifestFile::csv(path.display().to_string()))
        .collect();
    let manifest = ResultManifest::from_batch(batch, files);
    write_file(&paths.manifest, &manifest.to_json()?)?;

    info!(
        dir = %dir.display(),
        code = manifest.code,
        records = batch.records.len(),
        "wrote outputs"
    );
    Ok(manifest)
}

/// Write batch diagnostics as JSON into `dir`, returning the file path.
///
/// # Errors
///
/// Returns [`IoError::Write`] or [`IoError::Json`] on failure.
pub fn write_diagnostics(dir: &Path, diagnostics: &BatchDiagnostics) -> Result<PathBuf, IoError> {
    create_dir(dir)?;
    let path = dir.join(DIAGNOSTICS_FILE);
    write_file(&path, &serde_json::to_string_pretty(diagnostics)?)?;
    Ok(path)
}

fn create_dir(dir: &Path) -> Result<(), IoError> {
    std::fs::create_dir_all(dir).map_err(|source| IoError::Write {
        path: dir.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<(), IoError> {
    std::fs::write(path, contents).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })
}
