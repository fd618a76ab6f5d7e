//! Banksia - spatial orchestration over an Australian address gazetteer
//!
//! This library provides the coordinate, geocoding, proximity, boundary,
//! statistical-area, batch and monitoring services used by the query binary.

pub mod analytics;
pub mod batch;
pub mod boundary;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod geocoding;
pub mod models;
pub mod monitoring;
pub mod services;
pub mod statistical;
pub mod store;
pub mod transform;

pub use config::Config;
pub use error::{ErrorKind, Result, SpatialError};
pub use models::{Coordinate, ReferenceSystem};
pub use services::SpatialServices;
