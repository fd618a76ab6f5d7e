//! Gazetteer address candidates.

use serde::{Deserialize, Serialize};

use super::Coordinate;

/// Granularity of a matched coordinate, finest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrecisionTier {
    Property,
    Street,
    Locality,
    Region,
}

/// Reliability tiers run 1 (surveyed) to 3 (derived). Anything else
/// from the store is pinned to the least reliable tier.
pub fn normalize_reliability(tier: u8) -> u8 {
    tier.clamp(1, 3)
}

/// Structured pieces of a gazetteer address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressComponents {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suburb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
}

/// A gazetteer row projected for a single query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressCandidate {
    pub identifier: String,
    pub formatted_address: String,
    pub coordinate: Coordinate,
    pub precision_tier: PrecisionTier,
    pub reliability_tier: u8,
    /// 0..=100
    pub match_score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
}
