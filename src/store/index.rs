//! R-tree indexes backing the in-memory gazetteer.

use geo::{Area, BoundingRect, Contains, Point, Polygon};
use rstar::{RTree, RTreeObject, AABB};
use std::sync::Arc;
use tracing::info;

use crate::models::{Coordinate, ReferenceSystem};
use crate::transform;

/// Address point wrapper for R-tree indexing. `row` indexes the owning
/// store's row table.
#[derive(Debug, Clone, Copy)]
struct IndexedAddress {
    row: usize,
    point: [f64; 2],
}

impl RTreeObject for IndexedAddress {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

/// Spatial index over address points
pub struct AddressIndex {
    tree: RTree<IndexedAddress>,
    system: ReferenceSystem,
}

impl AddressIndex {
    /// Build from `(lon, lat)` pairs; position in the slice becomes the row id.
    pub fn build(points: &[(f64, f64)], system: ReferenceSystem) -> Self {
        let indexed: Vec<IndexedAddress> = points
            .iter()
            .enumerate()
            .map(|(row, &(lon, lat))| IndexedAddress {
                row,
                point: [lon, lat],
            })
            .collect();

        let tree = RTree::bulk_load(indexed);
        info!("Address index built with {} entries", tree.size());

        Self { tree, system }
    }

    /// Rows within `radius` metres of `center`, nearest first, as
    /// `(row, distance)`.
    ///
    /// The R-tree is probed with a degree envelope around the circle and the
    /// survivors are filtered by exact haversine distance.
    pub fn within_radius(&self, center: &Coordinate, radius: f64) -> Vec<(usize, f64)> {
        let envelope = radius_envelope(center, radius);

        let mut hits: Vec<(usize, f64)> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|entry| {
                let candidate = Coordinate::new(entry.point[1], entry.point[0], self.system);
                let distance = transform::distance(center, &candidate);
                (distance <= radius).then_some((entry.row, distance))
            })
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        hits
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

/// Mean earth radius used by `geo::Haversine`
const MEAN_EARTH_RADIUS: f64 = 6_371_008.8;

fn radius_envelope(center: &Coordinate, radius: f64) -> AABB<[f64; 2]> {
    let lat_degrees = (radius / MEAN_EARTH_RADIUS).to_degrees();
    let cos_lat = center.latitude.to_radians().cos().abs().max(1e-6);
    let lon_degrees = (radius / (MEAN_EARTH_RADIUS * cos_lat)).to_degrees();
    AABB::from_corners(
        [center.longitude - lon_degrees, center.latitude - lat_degrees],
        [center.longitude + lon_degrees, center.latitude + lat_degrees],
    )
}

/// Polygon wrapper for R-tree indexing of areas carrying a payload.
struct IndexedArea<T> {
    area: Arc<T>,
    polygon: Polygon<f64>,
    size: f64,
    envelope: AABB<[f64; 2]>,
}

impl<T> RTreeObject for IndexedArea<T> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl<T> IndexedArea<T> {
    fn new(area: T, polygon: Polygon<f64>) -> Option<Self> {
        let rect = polygon.bounding_rect()?;
        Some(Self {
            area: Arc::new(area),
            size: polygon.unsigned_area(),
            envelope: AABB::from_corners(
                [rect.min().x, rect.min().y],
                [rect.max().x, rect.max().y],
            ),
            polygon,
        })
    }
}

/// Spatial index for containment lookups (localities, statistical areas)
pub struct AreaIndex<T> {
    tree: RTree<IndexedArea<T>>,
}

impl<T> AreaIndex<T> {
    /// Build from payload/polygon pairs. Degenerate polygons are skipped.
    pub fn build(areas: Vec<(T, Polygon<f64>)>) -> Self {
        let indexed: Vec<IndexedArea<T>> = areas
            .into_iter()
            .filter_map(|(area, polygon)| IndexedArea::new(area, polygon))
            .collect();

        let tree = RTree::bulk_load(indexed);
        info!("Area index built with {} entries", tree.size());

        Self { tree }
    }

    /// Smallest area containing the point.
    ///
    /// Envelope intersection narrows the candidates, exact containment
    /// decides.
    pub fn lookup(&self, lon: f64, lat: f64) -> Option<Arc<T>> {
        let point = Point::new(lon, lat);
        let query_envelope = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&query_envelope)
            .filter(|ia| ia.polygon.contains(&point))
            .min_by(|a, b| a.size.total_cmp(&b.size))
            .map(|ia| Arc::clone(&ia.area))
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
