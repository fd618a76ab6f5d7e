//! Proximity search around a coordinate or a geocoded address.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SpatialError};
use crate::geocoding::{
    address_rows, normalize_limit, normalize_radius, reliability_confidence, GeocodingService,
};
use crate::models::{
    Coordinate, CoordinateInput, ProximityEntry, ProximityResult, ProximitySummary,
    ReferenceSystem,
};
use crate::store::{GazetteerQuery, GazetteerStore};
use crate::transform::{self, CoordinateTransform};

pub const DEFAULT_PROXIMITY_RADIUS: f64 = 1000.0;
pub const MAX_PROXIMITY_RADIUS: f64 = 5000.0;
pub const DEFAULT_PROXIMITY_LIMIT: usize = 10;
pub const MAX_PROXIMITY_LIMIT: usize = 50;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityRequest {
    #[serde(default)]
    pub coordinates: Option<CoordinateInput>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub coordinate_system: Option<String>,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub property_types: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub include_distance: bool,
    #[serde(default)]
    pub include_bearing: bool,
}

impl ProximityRequest {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            coordinates: Some(CoordinateInput {
                latitude,
                longitude,
            }),
            include_distance: true,
            ..Default::default()
        }
    }

    pub fn near_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            include_distance: true,
            ..Default::default()
        }
    }
}

pub struct SpatialAnalyticsService {
    store: Arc<dyn GazetteerStore>,
    geocoder: Arc<GeocodingService>,
    transform: CoordinateTransform,
}

impl SpatialAnalyticsService {
    pub fn new(
        store: Arc<dyn GazetteerStore>,
        geocoder: Arc<GeocodingService>,
        transform: CoordinateTransform,
    ) -> Self {
        Self {
            store,
            geocoder,
            transform,
        }
    }

    async fn resolve_center(&self, request: &ProximityRequest) -> Result<Coordinate> {
        let system = ReferenceSystem::parse_or(
            request.coordinate_system.as_deref(),
            self.transform.native_system(),
        )?;

        let center = match (&request.coordinates, &request.address) {
            (Some(input), _) => {
                return self
                    .transform
                    .validate_in(input.latitude, input.longitude, system)
            }
            (None, Some(address)) => self.geocoder.resolve_point(address, system).await?,
            (None, None) => return Err(SpatialError::MissingLocation),
        };

        self.transform.ensure_in_territory(&center)?;
        Ok(center)
    }

    /// Gazetteer entries within the radius, nearest first.
    pub async fn proximity(&self, request: &ProximityRequest) -> Result<ProximityResult> {
        let started = Instant::now();
        let radius = normalize_radius(
            request.radius,
            DEFAULT_PROXIMITY_RADIUS,
            MAX_PROXIMITY_RADIUS,
        )?;
        let limit = normalize_limit(request.limit, DEFAULT_PROXIMITY_LIMIT, MAX_PROXIMITY_LIMIT);
        let center = self.resolve_center(request).await?;
        let native_center = self.transform.to_native(&center);

        let rows = self
            .store
            .query(&GazetteerQuery::WithinRadius {
                center: native_center,
                radius_meters: radius,
                limit,
                property_types: request.property_types.clone(),
            })
            .await?;
        let rows = address_rows(rows)?;

        let native = self.store.native_system();
        let mut ranked: Vec<(f64, ProximityEntry)> = rows
            .iter()
            .filter_map(|row| {
                let position = row.coordinate(native);
                let distance = transform::distance(&native_center, &position);
                if distance > radius {
                    return None;
                }
                let bearing = request
                    .include_bearing
                    .then(|| transform::bearing(&native_center, &position));
                let candidate = row.to_candidate(
                    transform::convert(&position, center.reference_system),
                    reliability_confidence(row.reliability),
                );
                Some((
                    distance,
                    ProximityEntry {
                        candidate,
                        distance_meters: request.include_distance.then_some(distance),
                        bearing_degrees: bearing,
                    },
                ))
            })
            .collect();

        ranked.sort_by(|(da, a), (db, b)| {
            da.total_cmp(db)
                .then(a.candidate.reliability_tier.cmp(&b.candidate.reliability_tier))
                .then_with(|| a.candidate.identifier.cmp(&b.candidate.identifier))
        });
        ranked.truncate(limit);

        let count = ranked.len();
        let average_distance = if count == 0 {
            0.0
        } else {
            ranked.iter().map(|(d, _)| d).sum::<f64>() / count as f64
        };
        let results: Vec<ProximityEntry> = ranked.into_iter().map(|(_, entry)| entry).collect();

        debug!(
            "Proximity search at ({}, {}) r={}m returned {} results",
            center.latitude, center.longitude, radius, count
        );

        Ok(ProximityResult {
            center,
            radius_meters: radius,
            results,
            summary: ProximitySummary {
                count,
                average_distance,
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
        })
    }
}
