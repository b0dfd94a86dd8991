//! Plot location: which catalog plots does a raster cover?
//!
//! The catalog keeps an R-tree of plot envelopes. A query first pulls
//! envelope candidates from the tree, then confirms each with an exact
//! polygon/rectangle intersection, and finally restores catalog order so
//! output never depends on tree layout.

use geo::{BoundingRect, Intersects, Polygon, Rect};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, Envelope, RTree, RTreeObject, SelectionFunction};

use crate::georef::Crs;
use crate::types::{BoundaryGeometry, PipelineError, PlotBoundary, PlotId, Raster};

/// One named polygon in a [`PlotCatalog`].
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogPlot {
    /// Plot identifier.
    pub id: String,
    /// Plot outline in the catalog's CRS.
    pub polygon: Polygon<f64>,
    /// Species or germplasm planted in the plot.
    pub species: Option<String>,
}

impl CatalogPlot {
    /// A plot without species information.
    #[must_use]
    pub fn new(id: impl Into<String>, polygon: Polygon<f64>) -> Self {
        Self {
            id: id.into(),
            polygon,
            species: None,
        }
    }

    /// Attach a species name.
    #[must_use]
    pub fn with_species(self, species: impl Into<String>) -> Self {
        Self {
            species: Some(species.into()),
            ..self
        }
    }

    fn to_boundary(&self) -> PlotBoundary {
        PlotBoundary {
            id: PlotId::Named(self.id.clone()),
            geometry: BoundaryGeometry::Polygon(self.polygon.clone()),
            species: self.species.clone(),
        }
    }
}

type IndexedEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// An ordered, spatially indexed set of plot boundaries.
#[derive(Debug, Clone)]
pub struct PlotCatalog {
    plots: Vec<CatalogPlot>,
    crs: Option<Crs>,
    index: RTree<IndexedEnvelope>,
}

impl PlotCatalog {
    /// Build a catalog, indexing every plot with a non-empty outline.
    #[must_use]
    pub fn new(plots: Vec<CatalogPlot>, crs: Option<Crs>) -> Self {
        let envelopes = plots
            .iter()
            .enumerate()
            .filter_map(|(i, plot)| {
                let rect = plot.polygon.bounding_rect()?;
                let corners = Rectangle::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                );
                Some(GeomWithData::new(corners, i))
            })
            .collect();
        Self {
            plots,
            crs,
            index: RTree::bulk_load(envelopes),
        }
    }

    /// A catalog with no plots.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new(), None)
    }

    /// Plots in catalog order.
    #[must_use]
    pub fn plots(&self) -> &[CatalogPlot] {
        &self.plots
    }

    /// Declared CRS of the plot coordinates.
    #[must_use]
    pub const fn crs(&self) -> Option<Crs> {
        self.crs
    }

    /// Number of plots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plots.len()
    }

    /// Whether the catalog has no plots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }

    /// Plots whose outline intersects `bounds`, in catalog order.
    #[must_use]
    pub fn intersecting(&self, bounds: Rect<f64>) -> Vec<&CatalogPlot> {
        let query = AABB::from_corners(
            [bounds.min().x, bounds.min().y],
            [bounds.max().x, bounds.max().y],
        );
        let mut hits: Vec<usize> = self
            .index
            .locate_with_selection_function(EnvelopeQuery(query))
            .map(|entry| entry.data)
            .filter(|&i| self.plots[i].polygon.intersects(&bounds))
            .collect();
        hits.sort_unstable();
        hits.into_iter().map(|i| &self.plots[i]).collect()
    }
}

impl Default for PlotCatalog {
    fn default() -> Self {
        Self::empty()
    }
}

/// Selects tree entries whose envelope touches the query envelope.
struct EnvelopeQuery(AABB<[f64; 2]>);

impl SelectionFunction<IndexedEnvelope> for EnvelopeQuery {
    fn should_unpack_parent(&self, envelope: &AABB<[f64; 2]>) -> bool {
        self.0.intersects(envelope)
    }

    fn should_unpack_leaf(&self, leaf: &IndexedEnvelope) -> bool {
        self.0.intersects(&leaf.envelope())
    }
}

/// Find the plot boundaries that apply to `raster`.
///
/// An empty catalog, or a catalog none of whose plots touch the raster,
/// yields the single synthetic whole-image boundary.
///
/// # Errors
///
/// Returns [`PipelineError::Georeference`] when the catalog is not empty
/// and the raster has no georeferencing, declares no CRS, has a singular
/// geotransform, or declares a CRS different from the catalog's.
pub fn locate(raster: &Raster, catalog: &PlotCatalog) -> Result<Vec<PlotBoundary>, PipelineError> {
    if catalog.is_empty() {
        return Ok(vec![PlotBoundary::whole_image()]);
    }

    let Some(georeference) = raster.georeference() else {
        return Err(PipelineError::Georeference(
            "raster has no georeferencing; plot boundaries cannot be located".to_string(),
        ));
    };

    let Some(raster_crs) = georeference.crs else {
        return Err(PipelineError::Georeference(
            "raster declares no CRS; plot boundaries cannot be located".to_string(),
        ));
    };
    if let Some(catalog_crs) = catalog.crs()
        && raster_crs != catalog_crs
    {
        return Err(PipelineError::Georeference(format!(
            "raster CRS {raster_crs} does not match plot catalog CRS {catalog_crs}"
        )));
    }

    if georeference.transform.invert().is_none() {
        return Err(PipelineError::Georeference(
            "raster geotransform is not invertible".to_string(),
        ));
    }

    let bounds = georeference.transform.bounds(raster.dimensions());
    let plots: Vec<PlotBoundary> = catalog
        .intersecting(bounds)
        .into_iter()
        .map(CatalogPlot::to_boundary)
        .collect();

    if plots.is_empty() {
        tracing::debug!("no catalog plot intersects the raster; using the whole image");
        return Ok(vec![PlotBoundary::whole_image()]);
    }
    Ok(plots)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::georef::{GeoTransform, Georeference};
    use crate::types::{Pixels, RgbImage};

    const UTM_12N: Crs = Crs::epsg(32612);

    fn square(id: &str, x: f64, y: f64, size: f64) -> CatalogPlot {
        CatalogPlot::new(
            id,
            Rect::new((x, y), (x + size, y + size)).to_polygon(),
        )
    }

    /// 10x10 raster covering x in [0, 10], y in [0, 10].
    fn georeferenced_raster(crs: Option<Crs>) -> Raster {
        Raster::new(
            Pixels::Rgb(RgbImage::new(10, 10)),
            Some(Georeference {
                transform: GeoTransform::north_up(0.0, 10.0, 1.0, 1.0),
                crs,
            }),
        )
    }

    fn ids(plots: &[PlotBoundary]) -> Vec<String> {
        plots.iter().map(|p| p.id.to_string()).collect()
    }

    #[test]
    fn empty_catalog_yields_whole_image() {
        let raster = Raster::new(Pixels::Rgb(RgbImage::new(4, 4)), None);
        let plots = locate(&raster, &PlotCatalog::empty()).unwrap();
        assert_eq!(plots, vec![PlotBoundary::whole_image()]);
    }

    #[test]
    fn intersecting_plots_keep_catalog_order() {
        let catalog = PlotCatalog::new(
            vec![
                square("c", 6.0, 6.0, 2.0),
                square("far", 100.0, 100.0, 2.0),
                square("a", 1.0, 1.0, 2.0),
                square("b", 8.0, 0.0, 5.0),
            ],
            None,
        );
        let plots = locate(&georeferenced_raster(Some(UTM_12N)), &catalog).unwrap();
        assert_eq!(ids(&plots), ["c", "a", "b"]);
    }

    #[test]
    fn no_intersection_falls_back_to_whole_image() {
        let catalog = PlotCatalog::new(vec![square("far", 50.0, 50.0, 1.0)], None);
        let plots = locate(&georeferenced_raster(Some(UTM_12N)), &catalog).unwrap();
        assert_eq!(plots, vec![PlotBoundary::whole_image()]);
    }

    #[test]
    fn envelope_hit_without_polygon_intersection_is_rejected() {
        // An L-shaped plot whose envelope covers the raster corner but
        // whose outline does not.
        let l_shape = Polygon::new(
            vec![
                (11.0, -5.0),
                (20.0, -5.0),
                (20.0, 20.0),
                (-5.0, 20.0),
                (-5.0, 11.0),
                (11.0, 11.0),
            ]
            .into(),
            vec![],
        );
        let catalog = PlotCatalog::new(
            vec![CatalogPlot::new("l", l_shape), square("hit", 2.0, 2.0, 1.0)],
            None,
        );
        assert_eq!(catalog.intersecting(Rect::new((0.0, 0.0), (10.0, 10.0))).len(), 1);
    }

    #[test]
    fn catalog_without_georeference_is_an_error() {
        let raster = Raster::new(Pixels::Rgb(RgbImage::new(4, 4)), None);
        let catalog = PlotCatalog::new(vec![square("a", 0.0, 0.0, 1.0)], None);
        assert!(matches!(
            locate(&raster, &catalog),
            Err(PipelineError::Georeference(_))
        ));
    }

    #[test]
    fn mismatched_crs_is_an_error() {
        let catalog = PlotCatalog::new(vec![square("a", 0.0, 0.0, 1.0)], Some(Crs::epsg(4326)));
        let result = locate(&georeferenced_raster(Some(UTM_12N)), &catalog);
        assert!(matches!(result, Err(PipelineError::Georeference(_))));
    }

    #[test]
    fn raster_without_crs_is_an_error() {
        let raster = georeferenced_raster(None);
        for catalog_crs in [Some(UTM_12N), None] {
            let catalog = PlotCatalog::new(vec![square("a", 0.0, 0.0, 1.0)], catalog_crs);
            assert!(
                matches!(locate(&raster, &catalog), Err(PipelineError::Georeference(_))),
                "catalog CRS {catalog_crs:?}"
            );
        }
    }

    #[test]
    fn raster_without_crs_is_fine_without_catalog() {
        let plots = locate(&georeferenced_raster(None), &PlotCatalog::empty()).unwrap();
        assert_eq!(plots, vec![PlotBoundary::whole_image()]);
    }

    #[test]
    fn matching_crs_locates_plots() {
        let catalog = PlotCatalog::new(vec![square("a", 0.0, 0.0, 1.0)], Some(UTM_12N));
        let plots = locate(&georeferenced_raster(Some(UTM_12N)), &catalog).unwrap();
        assert_eq!(ids(&plots), ["a"]);
    }

    #[test]
    fn singular_transform_is_an_error() {
        let raster = Raster::new(
            Pixels::Rgb(RgbImage::new(4, 4)),
            Some(Georeference {
                transform: GeoTransform::north_up(0.0, 0.0, 0.0, 1.0),
                crs: Some(UTM_12N),
            }),
        );
        let catalog = PlotCatalog::new(vec![square("a", 0.0, 0.0, 1.0)], None);
        assert!(matches!(
            locate(&raster, &catalog),
            Err(PipelineError::Georeference(_))
        ));
    }

    #[test]
    fn species_is_carried_onto_boundary() {
        let catalog = PlotCatalog::new(
            vec![square("a", 1.0, 1.0, 2.0).with_species("Sorghum bicolor")],
            None,
        );
        let plots = locate(&georeferenced_raster(Some(UTM_12N)), &catalog).unwrap();
        assert_eq!(plots[0].species.as_deref(), Some("Sorghum bicolor"));
    }
}
