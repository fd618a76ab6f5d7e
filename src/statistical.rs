//! SA1 to SA4 classification by prefix derivation from the finest code.
//!
//! An SA1 code is 11 digits: the first 9 are its SA2, the first 5 its SA3
//! and the first 3 its SA4. The leading digit identifies the state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{CoordinateKey, TtlCache};
use crate::error::{Result, SpatialError};
use crate::geocoding::GeocodingService;
use crate::models::statistical::{STATISTICAL_SOURCE, UNKNOWN};
use crate::models::{
    Accuracy, AreaLevel, Coordinate, CoordinateInput, ReferenceSystem, StatisticalClassification,
    StatisticalHierarchy, StatisticalMetadata,
};
use crate::store::{GazetteerQuery, GazetteerStore, StatisticalAreaRow};
use crate::transform::CoordinateTransform;

const SA2_DIGITS: usize = 9;
const SA3_DIGITS: usize = 5;
const SA4_DIGITS: usize = 3;

pub fn state_for_code(code: &str) -> &'static str {
    match code.chars().next() {
        Some('1') => "NSW",
        Some('2') => "VIC",
        Some('3') => "QLD",
        Some('4') => "SA",
        Some('5') => "WA",
        Some('6') => "TAS",
        Some('7') => "NT",
        Some('8') => "ACT",
        Some('9') => "OT",
        _ => UNKNOWN,
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn prefix(code: &str, digits: usize) -> Option<&str> {
    code.get(..digits)
}

fn named_level(code: Option<&str>, level: &str) -> AreaLevel {
    match code {
        Some(code) => AreaLevel {
            code: code.to_string(),
            name: format!("{} {} {}", state_for_code(code), level, code),
        },
        None => AreaLevel::unknown(),
    }
}

/// Levels, hierarchy and accuracy derived from one containment row.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticalRecord {
    pub sa1: AreaLevel,
    pub sa2: AreaLevel,
    pub sa3: AreaLevel,
    pub sa4: AreaLevel,
    pub hierarchy: StatisticalHierarchy,
    pub accuracy: Accuracy,
}

impl From<&StatisticalAreaRow> for StatisticalRecord {
    fn from(row: &StatisticalAreaRow) -> Self {
        let hierarchy = StatisticalHierarchy {
            mesh_block: non_empty(&row.mesh_block_code)
                .unwrap_or(UNKNOWN)
                .to_string(),
            collection_district: non_empty(&row.collection_district)
                .unwrap_or(UNKNOWN)
                .to_string(),
        };
        let accuracy = if non_empty(&row.mesh_block_code).is_some() {
            Accuracy::Exact
        } else {
            Accuracy::Interpolated
        };

        let Some(sa1) = non_empty(&row.sa1_code) else {
            return Self {
                sa1: AreaLevel::unknown(),
                sa2: AreaLevel::unknown(),
                sa3: AreaLevel::unknown(),
                sa4: AreaLevel::unknown(),
                hierarchy,
                accuracy,
            };
        };

        let sa2_code = non_empty(&row.sa2_code).or_else(|| prefix(sa1, SA2_DIGITS));
        let sa2 = match sa2_code {
            Some(code) => AreaLevel {
                code: code.to_string(),
                name: non_empty(&row.sa2_name).unwrap_or(UNKNOWN).to_string(),
            },
            None => AreaLevel::unknown(),
        };

        Self {
            sa1: AreaLevel {
                code: sa1.to_string(),
                name: sa1.to_string(),
            },
            sa2,
            sa3: named_level(sa2_code.and_then(|c| prefix(c, SA3_DIGITS)), "SA3"),
            sa4: named_level(sa2_code.and_then(|c| prefix(c, SA4_DIGITS)), "SA4"),
            hierarchy,
            accuracy,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticalRequest {
    #[serde(default)]
    pub coordinates: Option<CoordinateInput>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub coordinate_system: Option<String>,
    #[serde(default)]
    pub include_hierarchy: bool,
}

impl StatisticalRequest {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            coordinates: Some(CoordinateInput {
                latitude,
                longitude,
            }),
            ..Default::default()
        }
    }
}

pub type StatisticalCache = TtlCache<CoordinateKey, StatisticalRecord>;

pub struct StatisticalAreaService {
    store: Arc<dyn GazetteerStore>,
    geocoder: Arc<GeocodingService>,
    transform: CoordinateTransform,
    cache: Arc<StatisticalCache>,
    precision: u32,
}

impl StatisticalAreaService {
    pub fn new(
        store: Arc<dyn GazetteerStore>,
        geocoder: Arc<GeocodingService>,
        transform: CoordinateTransform,
        cache: Arc<StatisticalCache>,
        precision: u32,
    ) -> Self {
        Self {
            store,
            geocoder,
            transform,
            cache,
            precision,
        }
    }

    pub fn cache(&self) -> &Arc<StatisticalCache> {
        &self.cache
    }

    async fn resolve(&self, request: &StatisticalRequest) -> Result<Coordinate> {
        let system = ReferenceSystem::parse_or(
            request.coordinate_system.as_deref(),
            self.transform.native_system(),
        )?;
        match (&request.coordinates, &request.address) {
            (Some(input), _) => self
                .transform
                .validate_in(input.latitude, input.longitude, system),
            (None, Some(address)) => {
                let point = self.geocoder.resolve_point(address, system).await?;
                self.transform.ensure_in_territory(&point)?;
                Ok(point)
            }
            (None, None) => Err(SpatialError::MissingLocation),
        }
    }

    pub async fn classify(
        &self,
        request: &StatisticalRequest,
    ) -> Result<StatisticalClassification> {
        let coordinate = self.resolve(request).await?;
        let point = self.transform.to_native(&coordinate);
        let key = CoordinateKey::quantize(&point, self.precision);

        let (record, cached) = self
            .cache
            .get_or_try_insert_with(key, || async move {
                let rows = self
                    .store
                    .query(&GazetteerQuery::StatisticalAreaContaining { point })
                    .await?;
                let row = rows
                    .into_iter()
                    .next()
                    .ok_or(SpatialError::StatisticalDataNotFound {
                        latitude: coordinate.latitude,
                        longitude: coordinate.longitude,
                    })?
                    .into_statistical_area()?;
                Ok::<_, SpatialError>(StatisticalRecord::from(&row))
            })
            .await?;

        if record.sa1.is_unknown() {
            debug!(
                "Statistical area at ({}, {}) carries no SA1 code",
                coordinate.latitude, coordinate.longitude
            );
        }

        Ok(StatisticalClassification {
            coordinate,
            sa1: record.sa1,
            sa2: record.sa2,
            sa3: record.sa3,
            sa4: record.sa4,
            hierarchy: request.include_hierarchy.then_some(record.hierarchy),
            metadata: StatisticalMetadata {
                source: STATISTICAL_SOURCE.to_string(),
                accuracy: record.accuracy,
                cached,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;
    use crate::store::fixtures;
    use crate::store::{MemoryGazetteer, QueryKind};
    use crate::transform::TerritoryBounds;
    use chrono::TimeDelta;

    fn service_with(store: Arc<MemoryGazetteer>) -> StatisticalAreaService {
        let transform =
            CoordinateTransform::new(TerritoryBounds::default(), ReferenceSystem::Gda2020);
        let geocoder = Arc::new(GeocodingService::new(store.clone(), transform));
        let cache = Arc::new(StatisticalCache::new(
            "statistical",
            TimeDelta::seconds(3600),
            100,
            Arc::new(ManualClock::default()),
        ));
        StatisticalAreaService::new(store, geocoder, transform, cache, 4)
    }

    fn row(sa1: Option<&str>, sa2: Option<&str>) -> StatisticalAreaRow {
        StatisticalAreaRow {
            sa1_code: sa1.map(String::from),
            sa2_code: sa2.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_prefix_derivation_from_sa2() {
        let record = StatisticalRecord::from(&row(Some("20663970001"), Some("206639700")));
        assert_eq!(record.sa2.code, "206639700");
        assert_eq!(record.sa3.code, "20663");
        assert_eq!(record.sa4.code, "206");
        assert!(record.sa3.name.contains("VIC"));
        assert!(record.sa4.name.contains("VIC"));
        assert_eq!(record.sa4.name, "VIC SA4 206");
    }

    #[test]
    fn test_sa2_falls_back_to_sa1_prefix() {
        let record = StatisticalRecord::from(&row(Some("30101100101"), None));
        assert_eq!(record.sa2.code, "301011001");
        assert_eq!(record.sa2.name, UNKNOWN);
        assert_eq!(record.sa3.code, "30101");
        assert_eq!(record.sa4.name, "QLD SA4 301");
        assert_eq!(record.accuracy, Accuracy::Interpolated);
    }

    #[test]
    fn test_missing_sa1_reports_unknown() {
        let record = StatisticalRecord::from(&row(None, Some("206639700")));
        for level in [&record.sa1, &record.sa2, &record.sa3, &record.sa4] {
            assert!(level.is_unknown());
        }
        assert_eq!(record.hierarchy.mesh_block, UNKNOWN);
    }

    #[test]
    fn test_state_for_code() {
        assert_eq!(state_for_code("8"), "ACT");
        assert_eq!(state_for_code("901"), "OT");
        assert_eq!(state_for_code("0"), UNKNOWN);
        assert_eq!(state_for_code(""), UNKNOWN);
    }

    #[tokio::test]
    async fn test_classify_melbourne_with_hierarchy() {
        let svc = service_with(Arc::new(fixtures::store()));
        let mut request = StatisticalRequest::at(-37.8136, 144.9631);
        request.include_hierarchy = true;
        let result = svc.classify(&request).await.unwrap();

        let codes: Vec<&str> = result.levels().iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, vec!["20663970001", "206639700", "20663", "206"]);
        assert_eq!(result.sa2.name, "Melbourne CBD - East");
        assert_eq!(result.metadata.accuracy, Accuracy::Exact);
        assert_eq!(result.metadata.source, STATISTICAL_SOURCE);
        let hierarchy = result.hierarchy.unwrap();
        assert_eq!(hierarchy.mesh_block, "20663970000");
        assert_eq!(hierarchy.collection_district, "2060101");
    }

    #[tokio::test]
    async fn test_classify_unknown_levels_do_not_fail() {
        let svc = service_with(Arc::new(fixtures::store()));
        let result = svc
            .classify(&StatisticalRequest::at(-38.15, 144.35))
            .await
            .unwrap();
        assert!(result.levels().iter().all(|l| l.is_unknown()));
        assert!(result.hierarchy.is_none());
        assert_eq!(result.metadata.accuracy, Accuracy::Interpolated);
    }

    #[tokio::test]
    async fn test_classify_by_address_and_cache() {
        let store = Arc::new(fixtures::store());
        let svc = service_with(store.clone());
        let request = StatisticalRequest {
            address: Some("25 Sturt Ballarat".to_string()),
            ..Default::default()
        };

        let first = svc.classify(&request).await.unwrap();
        let second = svc.classify(&request).await.unwrap();
        assert_eq!(first.sa4.name, "VIC SA4 201");
        assert!(!first.metadata.cached);
        assert!(second.metadata.cached);
        assert_eq!(store.query_count(QueryKind::StatisticalAreaContaining), 1);
    }

    #[tokio::test]
    async fn test_classify_errors() {
        let svc = service_with(Arc::new(fixtures::store()));

        let err = svc
            .classify(&StatisticalRequest::at(-20.0, 130.0))
            .await
            .unwrap_err();
        assert!(matches!(err, SpatialError::StatisticalDataNotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = svc
            .classify(&StatisticalRequest {
                address: Some("1 Imaginary Road".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GeocodingFailed);

        let err = svc
            .classify(&StatisticalRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SpatialError::MissingLocation));
    }
}
