//! Trait-database CSV serializer.
//!
//! One row per measurement, laid out for bulk upload to a plant trait
//! database: the capture time, the cover value, and the citation fields
//! stamped onto the record.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use canopy_pipeline::{CanopyCoverRecord, Cover};

use crate::error::{ExportError, finish};
use crate::format::{citation_year, cover_text, local_datetime};

/// Column names, in output order.
pub const TRAITS_HEADER: [&str; 9] = [
    "local_datetime",
    "canopy_cover",
    "access_level",
    "species",
    "site",
    "citation_author",
    "citation_year",
    "citation_title",
    "method",
];

/// Options for [`to_traits_csv`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TraitsOptions {
    /// Emit rows for no-data and failed records, with their sentinel
    /// values. Off by default: the trait database only takes
    /// measurements.
    pub include_sentinels: bool,
}

/// Serialize records into trait-database CSV.
///
/// The header is always written, so an empty batch yields a header-only
/// document.
///
/// # Errors
///
/// Returns [`ExportError`] if the CSV writer fails.
pub fn to_traits_csv(
    records: &[CanopyCoverRecord],
    options: TraitsOptions,
) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(TRAITS_HEADER)?;

    for record in records {
        if !options.include_sentinels && !matches!(record.cover, Cover::Percent(_)) {
            continue;
        }
        let provenance = &record.provenance;
        let timestamp = provenance.timestamp.as_deref().unwrap_or_default();
        let cover = cover_text(record.cover);
        let site = record.plot.to_string();
        let year = citation_year(provenance);
        writer.write_record([
            local_datetime(timestamp),
            cover.as_str(),
            provenance.access_level.as_str(),
            record.species.as_str(),
            site.as_str(),
            provenance.citation_author.as_str(),
            year.as_str(),
            provenance.citation_title.as_str(),
            provenance.method.as_str(),
        ])?;
    }

    finish(writer)
}
