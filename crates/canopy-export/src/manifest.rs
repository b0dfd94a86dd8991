//! JSON result manifest.
//!
//! Summarizes a run for the workflow engine that launched it: either a
//! list of produced files with code `0`, or a negative code with a
//! reason.

use serde::{Deserialize, Serialize};

use canopy_pipeline::BatchResult;

use crate::error::ExportError;

/// No input image could be loaded.
pub const NO_FILES_PROCESSED: i32 = -1000;

/// Images loaded, but no record carries a percentage.
pub const NO_COVER_CALCULATED: i32 = -1001;

/// One produced output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Path to the file, as written.
    pub path: String,
    /// File kind.
    pub key: String,
}

impl ManifestFile {
    /// A CSV output file.
    #[must_use]
    pub fn csv(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: "csv".to_string(),
        }
    }
}

/// Result manifest for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultManifest {
    /// `0` on success, negative on failure.
    pub code: i32,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Files produced on success.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ManifestFile>,
}

impl ResultManifest {
    /// Successful run that produced `files`.
    #[must_use]
    pub const fn success(files: Vec<ManifestFile>) -> Self {
        Self {
            code: 0,
            error: None,
            files,
        }
    }

    /// Failed run.
    #[must_use]
    pub fn failure(code: i32, error: impl Into<String>) -> Self {
        Self {
            code,
            error: Some(error.into()),
            files: Vec::new(),
        }
    }

    /// Manifest for a finished batch.
    ///
    /// `files` is only reported when at least one record carries a
    /// percentage.
    #[must_use]
    pub fn from_batch(batch: &BatchResult, files: Vec<ManifestFile>) -> Self {
        if batch.images == batch.failed_images() {
            Self::failure(NO_FILES_PROCESSED, "No files were processed")
        } else if batch.percent_count() == 0 {
            Self::failure(
                NO_COVER_CALCULATED,
                "No images were able to have their canopy cover calculated",
            )
        } else {
            Self::success(files)
        }
    }

    /// Whether the run succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Serialize as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
