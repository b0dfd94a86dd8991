//! canopy-export: Pure format serializers (sans-IO)
//!
//! Converts canopy cover records into output formats: the trait-database
//! CSV, the geostreams CSV, and the JSON result manifest. Every function
//! returns a `String`; writing files is the caller's job.

pub mod error;
pub mod format;
pub mod geostreams;
pub mod manifest;
pub mod traits;

pub use error::ExportError;
pub use format::{citation_year, cover_text, date_part, local_datetime, significant_digits};
pub use geostreams::{GEOSTREAMS_HEADER, to_geostreams_csv};
pub use manifest::{ManifestFile, ResultManifest};
pub use traits::{TRAITS_HEADER, TraitsOptions, to_traits_csv};
