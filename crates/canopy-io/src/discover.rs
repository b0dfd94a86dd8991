//! Input discovery.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::IoError;

/// File extensions accepted as input images (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["tif", "tiff", "png", "jpg", "jpeg"];

/// Whether `path` has a supported image extension.
#[must_use]
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Expand `inputs` into the list of image files to process.
///
/// Files are taken as given. Directories contribute their supported
/// files, sorted by path; subdirectories are not entered. Unsupported
/// files are skipped.
///
/// # Errors
///
/// Returns [`IoError::MissingInput`] for a path that does not exist,
/// [`IoError::Read`] if a directory cannot be listed, and
/// [`IoError::NoInputs`] when nothing supported remains.
pub fn discover_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, IoError> {
    let mut found = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut entries = list_directory(input)?;
            entries.sort();
            found.extend(entries);
        } else if input.is_file() {
            if is_supported(input) {
                found.push(input.clone());
            } else {
                debug!(path = %input.display(), "skipping unsupported file");
            }
        } else {
            return Err(IoError::MissingInput(input.clone()));
        }
    }

    if found.is_empty() {
        return Err(IoError::NoInputs);
    }
    debug!(count = found.len(), "discovered input images");
    Ok(found)
}

fn list_directory(dir: &Path) -> Result<Vec<PathBuf>, IoError> {
    let read_error = |source| IoError::Read {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        if !path.is_file() {
            continue;
        }
        if is_supported(&path) {
            files.push(path);
        } else {
            debug!(path = %path.display(), "skipping unsupported file");
        }
    }
    Ok(files)
}
