//! Coordinate validation, datum conversion and great-circle geometry.
//!
//! Everything here is pure. Conversion between GDA94 and GDA2020 uses the
//! published 7-parameter similarity (Helmert) transformation applied to
//! Earth-centred Cartesian coordinates on the GRS80 ellipsoid.

use geo::{Bearing, Distance, Haversine};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpatialError};
use crate::models::{Coordinate, ReferenceSystem};

/// GRS80 semi-major axis (metres)
const GRS80_A: f64 = 6_378_137.0;
/// GRS80 flattening
const GRS80_F: f64 = 1.0 / 298.257_222_101;

const ARC_SECOND: f64 = std::f64::consts::PI / (180.0 * 3600.0);

/// GDA94 -> GDA2020 parameters, coordinate frame rotation convention.
const GDA94_TO_GDA2020: Helmert = Helmert {
    tx: 0.06155,
    ty: -0.01087,
    tz: -0.04019,
    scale_ppm: -0.009994,
    rx_arcsec: -0.0394924,
    ry_arcsec: -0.0327221,
    rz_arcsec: -0.0328979,
};

#[derive(Debug, Clone, Copy)]
struct Helmert {
    tx: f64,
    ty: f64,
    tz: f64,
    scale_ppm: f64,
    rx_arcsec: f64,
    ry_arcsec: f64,
    rz_arcsec: f64,
}

impl Helmert {
    fn inverse(self) -> Self {
        Self {
            tx: -self.tx,
            ty: -self.ty,
            tz: -self.tz,
            scale_ppm: -self.scale_ppm,
            rx_arcsec: -self.rx_arcsec,
            ry_arcsec: -self.ry_arcsec,
            rz_arcsec: -self.rz_arcsec,
        }
    }

    fn apply(&self, [x, y, z]: [f64; 3]) -> [f64; 3] {
        let s = 1.0 + self.scale_ppm * 1e-6;
        let rx = self.rx_arcsec * ARC_SECOND;
        let ry = self.ry_arcsec * ARC_SECOND;
        let rz = self.rz_arcsec * ARC_SECOND;
        [
            self.tx + s * (x + rz * y - ry * z),
            self.ty + s * (-rz * x + y + rx * z),
            self.tz + s * (ry * x - rx * y + z),
        ]
    }
}

/// The latitude/longitude box outside of which coordinates are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerritoryBounds {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl Default for TerritoryBounds {
    fn default() -> Self {
        Self {
            min_latitude: -45.0,
            max_latitude: -10.0,
            min_longitude: 110.0,
            max_longitude: 155.0,
        }
    }
}

impl TerritoryBounds {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&latitude)
            && (self.min_longitude..=self.max_longitude).contains(&longitude)
    }
}

/// Validation and conversion bound to a territory box and the datastore's
/// native reference system.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateTransform {
    bounds: TerritoryBounds,
    native: ReferenceSystem,
}

impl CoordinateTransform {
    pub fn new(bounds: TerritoryBounds, native: ReferenceSystem) -> Self {
        Self { bounds, native }
    }

    pub fn bounds(&self) -> &TerritoryBounds {
        &self.bounds
    }

    pub fn native_system(&self) -> ReferenceSystem {
        self.native
    }

    /// Validate a raw pair against the territory box in the named system.
    pub fn validate(&self, latitude: f64, longitude: f64, system: &str) -> Result<Coordinate> {
        let system = ReferenceSystem::parse(system)?;
        self.validate_in(latitude, longitude, system)
    }

    pub fn validate_in(
        &self,
        latitude: f64,
        longitude: f64,
        system: ReferenceSystem,
    ) -> Result<Coordinate> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(SpatialError::InvalidCoordinates(format!(
                "latitude and longitude must be finite numbers, got ({}, {})",
                latitude, longitude
            )));
        }
        if !self.bounds.contains(latitude, longitude) {
            return Err(SpatialError::OutOfTerritory {
                latitude,
                longitude,
            });
        }
        Ok(Coordinate::new(latitude, longitude, system))
    }

    /// Re-check an already constructed coordinate (e.g. one produced by geocoding).
    pub fn ensure_in_territory(&self, coord: &Coordinate) -> Result<()> {
        self.validate_in(coord.latitude, coord.longitude, coord.reference_system)
            .map(|_| ())
    }

    pub fn to_native(&self, coord: &Coordinate) -> Coordinate {
        convert(coord, self.native)
    }
}

/// Convert `coord` into `to`. Identity when the systems already match.
pub fn convert(coord: &Coordinate, to: ReferenceSystem) -> Coordinate {
    let params = match (coord.reference_system, to) {
        (ReferenceSystem::Gda94, ReferenceSystem::Gda2020) => GDA94_TO_GDA2020,
        (ReferenceSystem::Gda2020, ReferenceSystem::Gda94) => GDA94_TO_GDA2020.inverse(),
        _ => return *coord,
    };

    let cartesian = params.apply(geodetic_to_cartesian(coord.latitude, coord.longitude));
    let (latitude, longitude) = cartesian_to_geodetic(cartesian);
    Coordinate::new(latitude, longitude, to)
}

/// Great-circle distance in metres.
pub fn distance(a: &Coordinate, b: &Coordinate) -> f64 {
    Haversine.distance(a.to_point(), b.to_point())
}

/// Initial bearing from `a` to `b`, degrees clockwise from north in [0, 360).
/// Coincident points have bearing 0.
pub fn bearing(a: &Coordinate, b: &Coordinate) -> f64 {
    if a.latitude == b.latitude && a.longitude == b.longitude {
        return 0.0;
    }
    let degrees = Haversine.bearing(a.to_point(), b.to_point()).rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if degrees >= 360.0 { 0.0 } else { degrees }
}

fn first_eccentricity_squared() -> f64 {
    GRS80_F * (2.0 - GRS80_F)
}

fn geodetic_to_cartesian(latitude: f64, longitude: f64) -> [f64; 3] {
    let e2 = first_eccentricity_squared();
    let phi = latitude.to_radians();
    let lambda = longitude.to_radians();
    let n = GRS80_A / (1.0 - e2 * phi.sin().powi(2)).sqrt();
    [
        n * phi.cos() * lambda.cos(),
        n * phi.cos() * lambda.sin(),
        n * (1.0 - e2) * phi.sin(),
    ]
}

fn cartesian_to_geodetic([x, y, z]: [f64; 3]) -> (f64, f64) {
    let e2 = first_eccentricity_squared();
    let longitude = y.atan2(x);
    let p = x.hypot(y);
    let mut latitude = z.atan2(p * (1.0 - e2));
    for _ in 0..6 {
        let n = GRS80_A / (1.0 - e2 * latitude.sin().powi(2)).sqrt();
        let h = p / latitude.cos() - n;
        latitude = z.atan2(p * (1.0 - e2 * n / (n + h)));
    }
    (latitude.to_degrees(), longitude.to_degrees())
}
