//! Export error type.

/// Errors that can occur while serializing records.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The CSV writer rejected a record.
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    /// Flushing the in-memory CSV buffer failed.
    #[error("failed to flush CSV buffer: {0}")]
    Flush(#[from] std::io::Error),

    /// Serialized output was not valid UTF-8.
    #[error("serialized output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// JSON serialization failed.
    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Finish an in-memory CSV writer and return its contents.
pub(crate) fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Flush(err.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}
