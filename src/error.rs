//! Error taxonomy shared by every service.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Stable, named error class handed to the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidInput,
    InvalidCoordinates,
    GeocodingFailed,
    NotFound,
    UnsupportedOperation,
    DependencyFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::InvalidCoordinates => "INVALID_COORDINATES",
            ErrorKind::GeocodingFailed => "GEOCODING_FAILED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            ErrorKind::DependencyFailure => "DEPENDENCY_FAILURE",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the spatial services.
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("coordinates ({latitude}, {longitude}) are outside Australian territory")]
    OutOfTerritory { latitude: f64, longitude: f64 },

    #[error("unknown coordinate reference system: {0}")]
    UnknownReferenceSystem(String),

    #[error("either coordinates or an address must be provided")]
    MissingLocation,

    #[error("geocoding failed: {0}")]
    GeocodingFailed(String),

    #[error("no locality found at ({latitude}, {longitude})")]
    LocalityNotFound { latitude: f64, longitude: f64 },

    #[error("no statistical area found at ({latitude}, {longitude})")]
    StatisticalDataNotFound { latitude: f64, longitude: f64 },

    #[error("alert not found: {0}")]
    AlertNotFound(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("datastore error: {0}")]
    Store(#[from] StoreError),
}

impl SpatialError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpatialError::InvalidInput(_) | SpatialError::MissingLocation => {
                ErrorKind::InvalidInput
            }
            SpatialError::InvalidCoordinates(_)
            | SpatialError::OutOfTerritory { .. }
            | SpatialError::UnknownReferenceSystem(_) => ErrorKind::InvalidCoordinates,
            SpatialError::GeocodingFailed(_) => ErrorKind::GeocodingFailed,
            SpatialError::LocalityNotFound { .. }
            | SpatialError::StatisticalDataNotFound { .. }
            | SpatialError::AlertNotFound(_) => ErrorKind::NotFound,
            SpatialError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            SpatialError::Store(_) => ErrorKind::DependencyFailure,
        }
    }
}

pub type Result<T> = std::result::Result<T, SpatialError>;
