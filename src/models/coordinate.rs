//! Coordinates and the reference systems they are expressed in.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpatialError};

/// Supported geodetic datums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceSystem {
    /// Geocentric Datum of Australia 2020 (EPSG:7844)
    #[serde(rename = "GDA2020")]
    Gda2020,
    /// Legacy Geocentric Datum of Australia 1994 (EPSG:4283)
    #[serde(rename = "GDA94")]
    Gda94,
}

impl ReferenceSystem {
    /// Parse a caller-supplied system name. WGS84 is treated as GDA2020,
    /// the two agree to well under a metre across the continent.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "GDA2020" | "EPSG:7844" | "WGS84" | "EPSG:4326" => Ok(ReferenceSystem::Gda2020),
            "GDA94" | "EPSG:4283" => Ok(ReferenceSystem::Gda94),
            _ => Err(SpatialError::UnknownReferenceSystem(name.to_string())),
        }
    }

    /// Parse an optional name, falling back to `default` when absent.
    pub fn parse_or(name: Option<&str>, default: ReferenceSystem) -> Result<Self> {
        match name {
            Some(name) => Self::parse(name),
            None => Ok(default),
        }
    }
}

impl std::fmt::Display for ReferenceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceSystem::Gda2020 => write!(f, "GDA2020"),
            ReferenceSystem::Gda94 => write!(f, "GDA94"),
        }
    }
}

/// A validated point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    pub reference_system: ReferenceSystem,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64, reference_system: ReferenceSystem) -> Self {
        Self {
            latitude,
            longitude,
            reference_system,
        }
    }

    /// x = longitude, y = latitude
    pub fn to_point(&self) -> geo::Point<f64> {
        geo::Point::new(self.longitude, self.latitude)
    }
}

/// Raw lat/lon pair as it arrives from the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinateInput {
    pub latitude: f64,
    pub longitude: f64,
}
