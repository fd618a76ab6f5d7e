//! Core data models shared by the spatial services.

pub mod address;
pub mod boundary;
pub mod coordinate;
pub mod proximity;
pub mod statistical;

pub use address::{normalize_reliability, AddressCandidate, AddressComponents, PrecisionTier};
pub use boundary::{
    BoundaryMetadata, BoundaryResult, ElectoralDistrict, LocalGovernmentArea, Locality,
    PostalArea,
};
pub use coordinate::{Coordinate, CoordinateInput, ReferenceSystem};
pub use proximity::{ProximityEntry, ProximityResult, ProximitySummary};
pub use statistical::{
    Accuracy, AreaLevel, StatisticalClassification, StatisticalHierarchy, StatisticalMetadata,
};
