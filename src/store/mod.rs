//! Narrow query interface over the address gazetteer.
//!
//! Services decide *what* to ask; a [`GazetteerStore`] only answers with
//! rows. The store is treated as stateless across calls and its errors are
//! propagated untouched.

mod index;
mod memory;

#[cfg(test)]
pub(crate) mod fixtures;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    normalize_reliability, AddressCandidate, AddressComponents, Coordinate, PrecisionTier,
    ReferenceSystem,
};

pub use index::{AddressIndex, AreaIndex};
pub use memory::{GazetteerDataset, LocalityArea, MemoryGazetteer, StatisticalAreaPolygon};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("datastore unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("query timed out")]
    Timeout,

    #[error("unexpected row type, expected {expected}")]
    UnexpectedRow { expected: &'static str },
}

/// Tokens extracted from a free-text address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressTokens {
    pub street_number: Option<String>,
    pub street_name: Option<String>,
    pub locality: Option<String>,
}

/// A statement issued against the gazetteer.
#[derive(Debug, Clone, PartialEq)]
pub enum GazetteerQuery {
    /// Text-match candidates for forward geocoding.
    AddressSearch {
        text: String,
        tokens: AddressTokens,
        limit: usize,
    },
    /// Address points within `radius_meters` of `center`, nearest first.
    WithinRadius {
        center: Coordinate,
        radius_meters: f64,
        limit: usize,
        property_types: Option<Vec<String>>,
    },
    /// The locality polygon enclosing `point`.
    LocalityContaining { point: Coordinate },
    /// The finest statistical area enclosing `point`.
    StatisticalAreaContaining { point: Coordinate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    AddressSearch,
    WithinRadius,
    LocalityContaining,
    StatisticalAreaContaining,
}

impl QueryKind {
    pub fn all() -> &'static [QueryKind] {
        &[
            QueryKind::AddressSearch,
            QueryKind::WithinRadius,
            QueryKind::LocalityContaining,
            QueryKind::StatisticalAreaContaining,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            QueryKind::AddressSearch => "address_search",
            QueryKind::WithinRadius => "within_radius",
            QueryKind::LocalityContaining => "locality_containing",
            QueryKind::StatisticalAreaContaining => "statistical_area_containing",
        }
    }

    fn index(&self) -> usize {
        match self {
            QueryKind::AddressSearch => 0,
            QueryKind::WithinRadius => 1,
            QueryKind::LocalityContaining => 2,
            QueryKind::StatisticalAreaContaining => 3,
        }
    }
}

impl GazetteerQuery {
    pub fn kind(&self) -> QueryKind {
        match self {
            GazetteerQuery::AddressSearch { .. } => QueryKind::AddressSearch,
            GazetteerQuery::WithinRadius { .. } => QueryKind::WithinRadius,
            GazetteerQuery::LocalityContaining { .. } => QueryKind::LocalityContaining,
            GazetteerQuery::StatisticalAreaContaining { .. } => {
                QueryKind::StatisticalAreaContaining
            }
        }
    }
}

/// An address point as stored in the gazetteer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRow {
    pub id: String,
    pub formatted_address: String,
    #[serde(default)]
    pub number_first: Option<String>,
    pub street_name: String,
    #[serde(default)]
    pub street_type: Option<String>,
    pub locality_name: String,
    pub state: String,
    #[serde(default)]
    pub postcode: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub precision: PrecisionTier,
    pub reliability: u8,
    #[serde(default)]
    pub property_type: Option<String>,
}

impl AddressRow {
    /// Position of this row in the store's native system.
    pub fn coordinate(&self, native: ReferenceSystem) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude, native)
    }

    pub fn components(&self) -> AddressComponents {
        AddressComponents {
            street_number: self.number_first.clone(),
            street_name: Some(self.street_name.clone()),
            street_type: self.street_type.clone(),
            suburb: Some(self.locality_name.clone()),
            state: Some(self.state.clone()),
            postcode: self.postcode.clone(),
        }
    }

    /// Project into a candidate whose coordinate is already in the caller's system.
    pub fn to_candidate(&self, coordinate: Coordinate, match_score: u8) -> AddressCandidate {
        AddressCandidate {
            identifier: self.id.clone(),
            formatted_address: self.formatted_address.clone(),
            coordinate,
            precision_tier: self.precision,
            reliability_tier: normalize_reliability(self.reliability),
            match_score: match_score.min(100),
            property_type: self.property_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalityRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub postcode: Option<String>,
    /// Raw local government area name, e.g. "Ballarat Shire".
    #[serde(default)]
    pub lga_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticalAreaRow {
    #[serde(default)]
    pub sa1_code: Option<String>,
    #[serde(default)]
    pub sa2_code: Option<String>,
    #[serde(default)]
    pub sa2_name: Option<String>,
    #[serde(default)]
    pub mesh_block_code: Option<String>,
    #[serde(default)]
    pub collection_district: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GazetteerRow {
    Address(AddressRow),
    Locality(LocalityRow),
    StatisticalArea(StatisticalAreaRow),
}

impl GazetteerRow {
    pub fn into_address(self) -> Result<AddressRow, StoreError> {
        match self {
            GazetteerRow::Address(row) => Ok(row),
            _ => Err(StoreError::UnexpectedRow { expected: "address" }),
        }
    }

    pub fn into_locality(self) -> Result<LocalityRow, StoreError> {
        match self {
            GazetteerRow::Locality(row) => Ok(row),
            _ => Err(StoreError::UnexpectedRow {
                expected: "locality",
            }),
        }
    }

    pub fn into_statistical_area(self) -> Result<StatisticalAreaRow, StoreError> {
        match self {
            GazetteerRow::StatisticalArea(row) => Ok(row),
            _ => Err(StoreError::UnexpectedRow {
                expected: "statistical area",
            }),
        }
    }
}

/// Connection and query-time snapshot reported to health checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMetrics {
    pub total_connections: usize,
    pub idle_connections: usize,
    pub waiting_requests: usize,
    pub max_connections: usize,
    pub total_queries: u64,
    pub average_query_ms: f64,
    pub slow_queries: u64,
}

impl StoreMetrics {
    /// Share of the pool currently busy, 0.0 when the pool size is unknown.
    pub fn pool_saturation(&self) -> f64 {
        if self.max_connections == 0 {
            return 0.0;
        }
        let busy = self.total_connections.saturating_sub(self.idle_connections);
        busy as f64 / self.max_connections as f64
    }
}

#[async_trait]
pub trait GazetteerStore: Send + Sync {
    /// Reference system the stored geometry is expressed in.
    fn native_system(&self) -> ReferenceSystem;

    async fn query(&self, query: &GazetteerQuery) -> Result<Vec<GazetteerRow>, StoreError>;

    fn metrics(&self) -> StoreMetrics;
}
