//! Forward and reverse geocoding.

pub mod scoring;
pub mod tokenize;

mod service;

pub use scoring::MatchRule;
pub use service::{
    reliability_confidence, GeocodeRequest, GeocodeResult, GeocodingService, ReverseGeocodeEntry,
    ReverseGeocodeResult, ReverseRequest,
};
pub(crate) use service::{address_rows, normalize_limit, normalize_radius};
