//! Forward and reverse geocoding against the gazetteer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::scoring::{best_match, MatchInput, MatchRule};
use super::tokenize::{normalize, tokenize};
use crate::error::{Result, SpatialError};
use crate::models::{
    AddressCandidate, AddressComponents, Coordinate, PrecisionTier, ReferenceSystem,
};
use crate::store::{AddressRow, GazetteerQuery, GazetteerRow, GazetteerStore};
use crate::transform::{self, CoordinateTransform};

pub const MAX_ADDRESS_LENGTH: usize = 500;

/// Rows fetched from the store per forward lookup before scoring.
const ADDRESS_CANDIDATE_LIMIT: usize = 50;

pub const DEFAULT_REVERSE_RADIUS: f64 = 100.0;
pub const MAX_REVERSE_RADIUS: f64 = 1000.0;
pub const DEFAULT_REVERSE_LIMIT: usize = 1;
pub const MAX_REVERSE_LIMIT: usize = 10;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeRequest {
    pub address: String,
    #[serde(default)]
    pub coordinate_system: Option<String>,
    #[serde(default = "default_true")]
    pub include_components: bool,
}

impl GeocodeRequest {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            coordinate_system: None,
            include_components: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeResult {
    pub success: bool,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<Coordinate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
    /// 0 when nothing matched.
    pub confidence: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<PrecisionTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reliability: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_rule: Option<MatchRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<AddressComponents>,
}

impl GeocodeResult {
    fn not_found(input: String) -> Self {
        Self {
            success: false,
            input,
            coordinate: None,
            formatted_address: None,
            confidence: 0,
            precision: None,
            reliability: None,
            identifier: None,
            match_rule: None,
            components: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub coordinate_system: Option<String>,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ReverseRequest {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            coordinate_system: None,
            radius: None,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseGeocodeEntry {
    pub candidate: AddressCandidate,
    pub distance_meters: f64,
    pub bearing_degrees: f64,
    pub confidence: u8,
    pub components: AddressComponents,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseGeocodeResult {
    pub query: Coordinate,
    pub radius_meters: f64,
    pub results: Vec<ReverseGeocodeEntry>,
}

/// Confidence attached to reverse hits, from the row's reliability tier.
pub fn reliability_confidence(reliability: u8) -> u8 {
    match reliability {
        1 => 90,
        2 => 75,
        _ => 60,
    }
}

/// Clamp an optional radius into `[1, max]`, rejecting non-numbers.
pub(crate) fn normalize_radius(radius: Option<f64>, default: f64, max: f64) -> Result<f64> {
    let radius = radius.unwrap_or(default);
    if !radius.is_finite() {
        return Err(SpatialError::InvalidInput(format!(
            "radius must be a finite number of metres, got {}",
            radius
        )));
    }
    Ok(radius.clamp(1.0, max))
}

pub(crate) fn normalize_limit(limit: Option<usize>, default: usize, max: usize) -> usize {
    limit.unwrap_or(default).clamp(1, max)
}

pub(crate) fn address_rows(rows: Vec<GazetteerRow>) -> Result<Vec<AddressRow>> {
    rows.into_iter()
        .map(|row| row.into_address().map_err(SpatialError::from))
        .collect()
}

pub struct GeocodingService {
    store: Arc<dyn GazetteerStore>,
    transform: CoordinateTransform,
}

impl GeocodingService {
    pub fn new(store: Arc<dyn GazetteerStore>, transform: CoordinateTransform) -> Self {
        Self { store, transform }
    }

    pub fn transform(&self) -> &CoordinateTransform {
        &self.transform
    }

    /// Resolve free text to the single best gazetteer row.
    ///
    /// No match is not an error: the result comes back with
    /// `success = false` and zero confidence.
    pub async fn geocode(&self, request: &GeocodeRequest) -> Result<GeocodeResult> {
        let address = request.address.trim();
        if address.is_empty() {
            return Err(SpatialError::InvalidInput(
                "address must not be empty".to_string(),
            ));
        }
        if address.chars().count() > MAX_ADDRESS_LENGTH {
            return Err(SpatialError::InvalidInput(format!(
                "address exceeds {} characters",
                MAX_ADDRESS_LENGTH
            )));
        }
        let output = ReferenceSystem::parse_or(
            request.coordinate_system.as_deref(),
            self.transform.native_system(),
        )?;

        let tokens = tokenize(address);
        let input = MatchInput::new(normalize(address), tokens.clone());
        let rows = self
            .store
            .query(&GazetteerQuery::AddressSearch {
                text: input.text.clone(),
                tokens,
                limit: ADDRESS_CANDIDATE_LIMIT,
            })
            .await?;
        let rows = address_rows(rows)?;

        let Some((row, rule, score)) = best_match(&input, &rows) else {
            debug!("No gazetteer match for '{}'", address);
            return Ok(GeocodeResult::not_found(address.to_string()));
        };

        debug!(
            "Geocoded '{}' to {} via {:?} ({} candidates)",
            address,
            row.id,
            rule,
            rows.len()
        );

        let native = row.coordinate(self.store.native_system());
        Ok(GeocodeResult {
            success: true,
            input: address.to_string(),
            coordinate: Some(transform::convert(&native, output)),
            formatted_address: Some(row.formatted_address.clone()),
            confidence: score,
            precision: Some(row.precision),
            reliability: Some(row.reliability),
            identifier: Some(row.id.clone()),
            match_rule: Some(rule),
            components: request.include_components.then(|| row.components()),
        })
    }

    /// Geocode `address` into a single point in `system`. Datastore failures
    /// keep their own kind; anything else becomes `GeocodingFailed`.
    pub async fn resolve_point(
        &self,
        address: &str,
        system: ReferenceSystem,
    ) -> Result<Coordinate> {
        let request = GeocodeRequest {
            address: address.to_string(),
            coordinate_system: Some(system.to_string()),
            include_components: false,
        };

        match self.geocode(&request).await {
            Ok(result) => result.coordinate.ok_or_else(|| {
                SpatialError::GeocodingFailed(format!(
                    "no gazetteer match for '{}'",
                    address.trim()
                ))
            }),
            Err(err @ SpatialError::Store(_)) => Err(err),
            Err(err) => Err(SpatialError::GeocodingFailed(err.to_string())),
        }
    }

    /// Address points around a coordinate, nearest first.
    pub async fn reverse_geocode(&self, request: &ReverseRequest) -> Result<ReverseGeocodeResult> {
        let system = ReferenceSystem::parse_or(
            request.coordinate_system.as_deref(),
            self.transform.native_system(),
        )?;
        let query = self
            .transform
            .validate_in(request.latitude, request.longitude, system)?;
        let radius = normalize_radius(request.radius, DEFAULT_REVERSE_RADIUS, MAX_REVERSE_RADIUS)?;
        let limit = normalize_limit(request.limit, DEFAULT_REVERSE_LIMIT, MAX_REVERSE_LIMIT);

        let center = self.transform.to_native(&query);
        let rows = self
            .store
            .query(&GazetteerQuery::WithinRadius {
                center,
                radius_meters: radius,
                limit,
                property_types: None,
            })
            .await?;
        let rows = address_rows(rows)?;

        let native = self.store.native_system();
        let mut results: Vec<ReverseGeocodeEntry> = rows
            .iter()
            .map(|row| {
                let position = row.coordinate(native);
                let confidence = reliability_confidence(row.reliability);
                ReverseGeocodeEntry {
                    candidate: row.to_candidate(transform::convert(&position, system), confidence),
                    distance_meters: transform::distance(&center, &position),
                    bearing_degrees: transform::bearing(&center, &position),
                    confidence,
                    components: row.components(),
                }
            })
            .collect();

        results.sort_by(|a, b| {
            a.distance_meters
                .total_cmp(&b.distance_meters)
                .then(a.candidate.reliability_tier.cmp(&b.candidate.reliability_tier))
                .then_with(|| a.candidate.identifier.cmp(&b.candidate.identifier))
        });
        results.truncate(limit);

        Ok(ReverseGeocodeResult {
            query,
            radius_meters: radius,
            results,
        })
    }
}
