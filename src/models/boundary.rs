//! Administrative boundary results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Coordinate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locality {
    pub name: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalGovernmentArea {
    pub name: String,
    /// Derived from the naming convention of `name`, e.g. "Shire".
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalArea {
    pub postcode: String,
    /// State or territory abbreviation that delivers this postcode.
    pub delivery_region: String,
}

/// Never populated: the boundary dataset carries no electoral geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectoralDistrict {
    pub name: String,
    pub jurisdiction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryMetadata {
    pub cached: bool,
    pub looked_up_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryResult {
    pub coordinate: Coordinate,
    pub locality: Locality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_government_area: Option<LocalGovernmentArea>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_area: Option<PostalArea>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electoral_district: Option<ElectoralDistrict>,
    pub metadata: BoundaryMetadata,
}
