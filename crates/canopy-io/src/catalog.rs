//! GeoJSON plot catalog loading.
//!
//! A catalog is a `FeatureCollection` whose features are plot outlines.
//! Each feature needs a `Polygon` or `MultiPolygon` geometry (only the
//! first polygon of a multipolygon is used) and an identifier, taken
//! from the first of the `id`, `name`, `plot` or `site` properties that
//! holds a string or number, else from the feature id. An optional
//! `species` property is carried onto the plot's records.
//!
//! The catalog CRS comes from the legacy top-level `crs` member:
//!
//! ```json
//! {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32612"}}
//! ```

use std::path::Path;

use geo::{MultiPolygon, Polygon};
use geojson::{Feature, GeoJson, JsonObject, JsonValue, feature::Id};
use tracing::{info, warn};

use canopy_pipeline::{CatalogPlot, Crs, PlotCatalog};

use crate::error::IoError;

/// Properties searched, in order, for a plot identifier.
const ID_PROPERTIES: [&str; 4] = ["id", "name", "plot", "site"];

/// Property holding the plot's species.
const SPECIES_PROPERTY: &str = "species";

/// WGS 84 longitude/latitude, the GeoJSON default.
const EPSG_WGS84: u32 = 4326;

/// Read and parse a plot catalog file.
///
/// # Errors
///
/// Returns [`IoError::Read`] if the file cannot be read, otherwise the
/// errors of [`parse_catalog`].
pub fn load_catalog(path: &Path) -> Result<PlotCatalog, IoError> {
    let text = std::fs::read_to_string(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let catalog = parse_catalog(&text)?;
    info!(
        path = %path.display(),
        plots = catalog.len(),
        crs = ?catalog.crs().map(|crs| crs.to_string()),
        "loaded plot catalog"
    );
    Ok(catalog)
}

/// Parse a plot catalog from GeoJSON text.
///
/// Features without an areal geometry are skipped with a warning.
///
/// # Errors
///
/// Returns [`IoError::GeoJson`] for malformed GeoJSON and
/// [`IoError::Catalog`] when the document is not a feature collection,
/// a plot has no identifier, or the CRS is not an EPSG code.
pub fn parse_catalog(text: &str) -> Result<PlotCatalog, IoError> {
    let GeoJson::FeatureCollection(collection) = text.parse::<GeoJson>()? else {
        return Err(IoError::Catalog(
            "expected a GeoJSON FeatureCollection".to_string(),
        ));
    };

    let crs = catalog_crs(collection.foreign_members.as_ref())?;

    let mut plots = Vec::with_capacity(collection.features.len());
    for (index, feature) in collection.features.into_iter().enumerate() {
        if let Some(plot) = catalog_plot(index, feature)? {
            plots.push(plot);
        }
    }

    Ok(PlotCatalog::new(plots, crs))
}

fn catalog_plot(index: usize, feature: Feature) -> Result<Option<CatalogPlot>, IoError> {
    let id = plot_id(&feature)
        .ok_or_else(|| IoError::Catalog(format!("feature {index} has no plot identifier")))?;

    let Some(polygon) = feature
        .geometry
        .map(|geometry| first_polygon(geometry.value))
        .transpose()?
        .flatten()
    else {
        warn!(plot = %id, "skipping feature without a polygon geometry");
        return Ok(None);
    };

    let species = feature
        .properties
        .as_ref()
        .and_then(|properties| properties.get(SPECIES_PROPERTY))
        .and_then(JsonValue::as_str);

    let plot = CatalogPlot::new(id, polygon);
    Ok(Some(match species {
        Some(species) => plot.with_species(species),
        None => plot,
    }))
}

fn plot_id(feature: &Feature) -> Option<String> {
    let from_properties = feature.properties.as_ref().and_then(|properties| {
        ID_PROPERTIES
            .iter()
            .find_map(|key| properties.get(*key).and_then(scalar_text))
    });
    from_properties.or_else(|| {
        feature.id.as_ref().map(|id| match id {
            Id::String(s) => s.clone(),
            Id::Number(n) => n.to_string(),
        })
    })
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_polygon(value: geojson::Value) -> Result<Option<Polygon<f64>>, IoError> {
    match value {
        value @ geojson::Value::Polygon(_) => Ok(Some(Polygon::try_from(value)?)),
        value @ geojson::Value::MultiPolygon(_) => {
            Ok(MultiPolygon::<f64>::try_from(value)?.0.into_iter().next())
        }
        _ => Ok(None),
    }
}

fn catalog_crs(members: Option<&JsonObject>) -> Result<Option<Crs>, IoError> {
    let Some(crs) = members.and_then(|members| members.get("crs")) else {
        return Ok(None);
    };
    let name = crs
        .pointer("/properties/name")
        .and_then(JsonValue::as_str)
        .or_else(|| crs.as_str())
        .ok_or_else(|| IoError::Catalog("crs member has no name".to_string()))?;
    parse_crs_name(name)
        .map(Some)
        .ok_or_else(|| IoError::Catalog(format!("unsupported CRS {name:?}")))
}

/// EPSG names, plus the OGC `CRS84` alias for WGS 84.
fn parse_crs_name(name: &str) -> Option<Crs> {
    Crs::parse(name).or_else(|| {
        name.trim()
            .to_ascii_uppercase()
            .ends_with("CRS84")
            .then_some(Crs::epsg(EPSG_WGS84))
    })
}
