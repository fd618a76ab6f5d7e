//! Statistical-area classification results.

use serde::{Deserialize, Serialize};

use super::Coordinate;

/// Value reported for any level or hierarchy field that cannot be derived.
pub const UNKNOWN: &str = "Unknown";

/// Data release the classification codes are drawn from.
pub const STATISTICAL_SOURCE: &str = "ABS ASGS Edition 3 (2021)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaLevel {
    pub code: String,
    pub name: String,
}

impl AreaLevel {
    pub fn unknown() -> Self {
        Self {
            code: UNKNOWN.to_string(),
            name: UNKNOWN.to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.code == UNKNOWN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Accuracy {
    Exact,
    Interpolated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticalHierarchy {
    pub mesh_block: String,
    pub collection_district: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticalMetadata {
    pub source: String,
    pub accuracy: Accuracy,
    pub cached: bool,
}

/// SA1 (finest) through SA4 (coarsest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticalClassification {
    pub coordinate: Coordinate,
    pub sa1: AreaLevel,
    pub sa2: AreaLevel,
    pub sa3: AreaLevel,
    pub sa4: AreaLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<StatisticalHierarchy>,
    pub metadata: StatisticalMetadata,
}

impl StatisticalClassification {
    /// Levels ordered finest to coarsest.
    pub fn levels(&self) -> [&AreaLevel; 4] {
        [&self.sa1, &self.sa2, &self.sa3, &self.sa4]
    }
}
