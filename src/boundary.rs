//! Administrative boundary lookup with a read-through coordinate cache.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{CoordinateKey, TtlCache};
use crate::clock::Clock;
use crate::error::{Result, SpatialError};
use crate::models::{
    BoundaryMetadata, BoundaryResult, CoordinateInput, LocalGovernmentArea, Locality, PostalArea,
    ReferenceSystem,
};
use crate::store::{GazetteerQuery, GazetteerStore, LocalityRow};
use crate::transform::CoordinateTransform;

/// Fallback category when no naming convention matches.
pub const DEFAULT_LGA_CATEGORY: &str = "Area";

/// Longer phrases come first so "Rural City" wins over "City".
const LGA_CATEGORIES: &[&str] = &[
    "Rural City",
    "Regional Council",
    "Aboriginal Shire",
    "City",
    "Shire",
    "Town",
    "Municipality",
    "Borough",
    "Council",
];

static LGA_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    LGA_CATEGORIES
        .iter()
        .map(|category| {
            let pattern = format!(r"(?i)\b{}\b", category.replace(' ', r"\s+"));
            (
                Regex::new(&pattern).expect("category pattern is valid"),
                *category,
            )
        })
        .collect()
});

/// Inclusive postcode ranges and the state or territory that delivers them.
const POSTCODE_REGIONS: &[(u16, u16, &str)] = &[
    (200, 299, "ACT"),
    (800, 999, "NT"),
    (1000, 2599, "NSW"),
    (2600, 2618, "ACT"),
    (2619, 2899, "NSW"),
    (2900, 2920, "ACT"),
    (2921, 2999, "NSW"),
    (3000, 3999, "VIC"),
    (4000, 4999, "QLD"),
    (5000, 5999, "SA"),
    (6000, 6999, "WA"),
    (7000, 7999, "TAS"),
];

pub fn lga_category(name: &str) -> &'static str {
    LGA_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(name))
        .map(|(_, category)| *category)
        .unwrap_or(DEFAULT_LGA_CATEGORY)
}

pub fn delivery_region(postcode: &str) -> &'static str {
    let postcode = postcode.trim();
    if postcode.is_empty() || postcode.len() > 4 || !postcode.chars().all(|c| c.is_ascii_digit()) {
        return "Unknown";
    }
    let Ok(value) = postcode.parse::<u16>() else {
        return "Unknown";
    };
    POSTCODE_REGIONS
        .iter()
        .find(|(low, high, _)| (*low..=*high).contains(&value))
        .map(|(_, _, region)| *region)
        .unwrap_or("Unknown")
}

/// Everything derivable from one containment row. Cached independently of
/// which parts a caller asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRecord {
    pub locality: Locality,
    pub local_government_area: Option<LocalGovernmentArea>,
    pub postal_area: Option<PostalArea>,
}

impl From<LocalityRow> for BoundaryRecord {
    fn from(row: LocalityRow) -> Self {
        let local_government_area = row.lga_name.as_ref().map(|name| LocalGovernmentArea {
            name: name.clone(),
            category: lga_category(name).to_string(),
        });
        let postal_area = row.postcode.as_ref().map(|postcode| PostalArea {
            postcode: postcode.clone(),
            delivery_region: delivery_region(postcode).to_string(),
        });
        Self {
            locality: Locality {
                name: row.name,
                id: row.id,
                postcode: row.postcode,
            },
            local_government_area,
            postal_area,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryRequest {
    pub coordinates: CoordinateInput,
    #[serde(default)]
    pub coordinate_system: Option<String>,
    #[serde(default = "default_true", rename = "includeLGA", alias = "includeLga")]
    pub include_lga: bool,
    #[serde(default)]
    pub include_electoral: bool,
    #[serde(default = "default_true")]
    pub include_postal: bool,
}

impl BoundaryRequest {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            coordinates: CoordinateInput {
                latitude,
                longitude,
            },
            coordinate_system: None,
            include_lga: true,
            include_electoral: false,
            include_postal: true,
        }
    }
}

pub type BoundaryCache = TtlCache<CoordinateKey, BoundaryRecord>;

pub struct BoundaryService {
    store: Arc<dyn GazetteerStore>,
    transform: CoordinateTransform,
    cache: Arc<BoundaryCache>,
    precision: u32,
    clock: Arc<dyn Clock>,
}

impl BoundaryService {
    pub fn new(
        store: Arc<dyn GazetteerStore>,
        transform: CoordinateTransform,
        cache: Arc<BoundaryCache>,
        precision: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            transform,
            cache,
            precision,
            clock,
        }
    }

    pub fn cache(&self) -> &Arc<BoundaryCache> {
        &self.cache
    }

    pub async fn lookup(&self, request: &BoundaryRequest) -> Result<BoundaryResult> {
        let system = ReferenceSystem::parse_or(
            request.coordinate_system.as_deref(),
            self.transform.native_system(),
        )?;
        let coordinate = self.transform.validate_in(
            request.coordinates.latitude,
            request.coordinates.longitude,
            system,
        )?;
        let point = self.transform.to_native(&coordinate);
        let key = CoordinateKey::quantize(&point, self.precision);

        let (record, cached) = self
            .cache
            .get_or_try_insert_with(key, || async move {
                let rows = self
                    .store
                    .query(&GazetteerQuery::LocalityContaining { point })
                    .await?;
                let row = rows
                    .into_iter()
                    .next()
                    .ok_or(SpatialError::LocalityNotFound {
                        latitude: coordinate.latitude,
                        longitude: coordinate.longitude,
                    })?
                    .into_locality()?;
                Ok::<_, SpatialError>(BoundaryRecord::from(row))
            })
            .await?;

        if request.include_electoral {
            debug!("Electoral districts requested but not present in the boundary dataset");
        }

        Ok(BoundaryResult {
            coordinate,
            locality: record.locality,
            local_government_area: record.local_government_area.filter(|_| request.include_lga),
            postal_area: record.postal_area.filter(|_| request.include_postal),
            electoral_district: None,
            metadata: BoundaryMetadata {
                cached,
                looked_up_at: self.clock.now(),
            },
        })
    }
}
