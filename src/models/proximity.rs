//! Proximity search results.

use serde::{Deserialize, Serialize};

use super::{AddressCandidate, Coordinate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityEntry {
    pub candidate: AddressCandidate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing_degrees: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximitySummary {
    pub count: usize,
    /// Mean over the returned entries only.
    pub average_distance: f64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityResult {
    pub center: Coordinate,
    pub radius_meters: f64,
    /// Ascending by distance, ties broken by reliability tier.
    pub results: Vec<ProximityEntry>,
    pub summary: ProximitySummary,
}
