//! Geostreams CSV serializer.
//!
//! One row per measurement with the plot centroid as a location, for
//! time-series stores keyed by site and position. No-data and failed
//! records are kept with their sentinel values.

use canopy_pipeline::CanopyCoverRecord;

use crate::error::{ExportError, finish};
use crate::format::{cover_text, date_part, local_datetime};

/// Column names, in output order.
pub const GEOSTREAMS_HEADER: [&str; 8] = [
    "site",
    "trait",
    "lat",
    "lon",
    "dp_time",
    "source",
    "value",
    "timestamp",
];

/// Trait name written to every row.
pub const TRAIT_NAME: &str = "Canopy Cover";

/// Serialize records into geostreams CSV.
///
/// `lat` and `lon` are the centroid's y and x, left empty when the
/// record has no centroid.
///
/// # Errors
///
/// Returns [`ExportError`] if the CSV writer fails.
pub fn to_geostreams_csv(records: &[CanopyCoverRecord]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(GEOSTREAMS_HEADER)?;

    for record in records {
        let timestamp = record.provenance.timestamp.as_deref().unwrap_or_default();
        let (lat, lon) = record
            .centroid
            .map_or_else(Default::default, |(x, y)| (y.to_string(), x.to_string()));
        let site = record.plot.to_string();
        let value = cover_text(record.cover);
        writer.write_record([
            site.as_str(),
            TRAIT_NAME,
            lat.as_str(),
            lon.as_str(),
            local_datetime(timestamp),
            record.image.as_str(),
            value.as_str(),
            date_part(timestamp),
        ])?;
    }

    finish(writer)
}
