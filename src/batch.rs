//! Concurrent execution of heterogeneous spatial operations.
//!
//! Operations are split into sequential groups of at most `batch_size`.
//! Members of a group run concurrently and the group settles before the
//! next one starts, so at most `batch_size` datastore calls are in flight
//! per batch. Fail-fast is only checked between groups.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use hashbrown::HashSet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analytics::{ProximityRequest, SpatialAnalyticsService};
use crate::boundary::{BoundaryRequest, BoundaryService};
use crate::config::BatchConfig;
use crate::error::{ErrorKind, Result, SpatialError};
use crate::models::{BoundaryResult, ProximityResult, StatisticalClassification};
use crate::monitoring::PerformanceMonitor;
use crate::statistical::{StatisticalAreaService, StatisticalRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Proximity,
    Boundary,
    Statistical,
}

impl OperationKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "proximity" => Some(OperationKind::Proximity),
            "boundary" => Some(OperationKind::Boundary),
            "statistical" => Some(OperationKind::Statistical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Proximity => "proximity",
            OperationKind::Boundary => "boundary",
            OperationKind::Statistical => "statistical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOperation {
    pub id: String,
    /// Kept as text so an unknown kind becomes a per-operation error
    /// instead of rejecting the whole request.
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl BatchOperation {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            parameters,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOptions {
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub fail_fast: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub operations: Vec<BatchOperation>,
    #[serde(default)]
    pub options: BatchOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SpatialError> for OutcomeError {
    fn from(err: &SpatialError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OperationData {
    Proximity(ProximityResult),
    Boundary(BoundaryResult),
    Statistical(StatisticalClassification),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub id: String,
    pub kind: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<OperationData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
    pub processing_time_ms: u64,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_operations: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub batch_size: usize,
    pub fail_fast: bool,
    pub processing_time_ms: u64,
    pub short_circuited: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    pub results: Vec<BatchOutcome>,
    pub summary: BatchSummary,
}

/// The services a batch can route operations to.
#[async_trait]
pub trait SpatialDispatch: Send + Sync {
    async fn proximity(&self, request: &ProximityRequest) -> Result<ProximityResult>;

    async fn boundary(&self, request: &BoundaryRequest) -> Result<BoundaryResult>;

    async fn statistical(&self, request: &StatisticalRequest)
        -> Result<StatisticalClassification>;
}

/// Routes to the service instances, recording one sample per operation.
pub struct ServiceDispatch {
    analytics: Arc<SpatialAnalyticsService>,
    boundary: Arc<BoundaryService>,
    statistical: Arc<StatisticalAreaService>,
    monitor: Arc<PerformanceMonitor>,
}

impl ServiceDispatch {
    pub fn new(
        analytics: Arc<SpatialAnalyticsService>,
        boundary: Arc<BoundaryService>,
        statistical: Arc<StatisticalAreaService>,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            analytics,
            boundary,
            statistical,
            monitor,
        }
    }
}

#[async_trait]
impl SpatialDispatch for ServiceDispatch {
    async fn proximity(&self, request: &ProximityRequest) -> Result<ProximityResult> {
        self.monitor
            .observe("proximity", self.analytics.proximity(request), |_| false)
            .await
    }

    async fn boundary(&self, request: &BoundaryRequest) -> Result<BoundaryResult> {
        self.monitor
            .observe("boundary", self.boundary.lookup(request), |r| {
                r.metadata.cached
            })
            .await
    }

    async fn statistical(
        &self,
        request: &StatisticalRequest,
    ) -> Result<StatisticalClassification> {
        self.monitor
            .observe("statistical", self.statistical.classify(request), |r| {
                r.metadata.cached
            })
            .await
    }
}

fn decode<T: DeserializeOwned>(operation: &BatchOperation, kind: OperationKind) -> Result<T> {
    serde_json::from_value(operation.parameters.clone()).map_err(|e| {
        SpatialError::InvalidInput(format!(
            "invalid {} parameters for operation {}: {}",
            kind.as_str(),
            operation.id,
            e
        ))
    })
}

/// Counts a batch as active for as long as it is held.
struct ActiveJob<'a>(&'a AtomicUsize);

impl<'a> ActiveJob<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveJob<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct BatchSpatialService {
    dispatch: Arc<dyn SpatialDispatch>,
    limits: BatchConfig,
    active_jobs: AtomicUsize,
}

impl BatchSpatialService {
    pub fn new(dispatch: Arc<dyn SpatialDispatch>, limits: BatchConfig) -> Self {
        Self {
            dispatch,
            limits,
            active_jobs: AtomicUsize::new(0),
        }
    }

    /// Batches currently executing.
    pub fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::SeqCst)
    }

    pub fn effective_batch_size(&self, requested: Option<usize>, operations: usize) -> usize {
        requested
            .unwrap_or(self.limits.default_size)
            .clamp(1, self.limits.max_size.max(1))
            .min(operations.max(1))
    }

    fn validate(&self, request: &BatchRequest) -> Result<()> {
        let operations = &request.operations;
        if operations.is_empty() {
            return Err(SpatialError::InvalidInput(
                "operations must not be empty".to_string(),
            ));
        }
        if operations.len() > self.limits.max_operations {
            return Err(SpatialError::InvalidInput(format!(
                "batch of {} operations exceeds the limit of {}",
                operations.len(),
                self.limits.max_operations
            )));
        }

        let mut seen = HashSet::with_capacity(operations.len());
        for operation in operations {
            if operation.id.trim().is_empty() {
                return Err(SpatialError::InvalidInput(
                    "operation id must not be empty".to_string(),
                ));
            }
            if !seen.insert(operation.id.as_str()) {
                return Err(SpatialError::InvalidInput(format!(
                    "duplicate operation id: {}",
                    operation.id
                )));
            }
        }
        Ok(())
    }

    async fn execute(&self, operation: &BatchOperation) -> Result<OperationData> {
        let Some(kind) = OperationKind::parse(&operation.kind) else {
            return Err(SpatialError::UnsupportedOperation(format!(
                "unknown operation kind '{}'",
                operation.kind
            )));
        };

        let data = match kind {
            OperationKind::Proximity => {
                let request: ProximityRequest = decode(operation, kind)?;
                OperationData::Proximity(self.dispatch.proximity(&request).await?)
            }
            OperationKind::Boundary => {
                let request: BoundaryRequest = decode(operation, kind)?;
                OperationData::Boundary(self.dispatch.boundary(&request).await?)
            }
            OperationKind::Statistical => {
                let request: StatisticalRequest = decode(operation, kind)?;
                OperationData::Statistical(self.dispatch.statistical(&request).await?)
            }
        };
        Ok(data)
    }

    /// Never fails: errors become part of the outcome.
    async fn run_operation(&self, operation: &BatchOperation) -> BatchOutcome {
        let started = Instant::now();
        let result = self.execute(operation).await;
        let processing_time_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(data) => BatchOutcome {
                id: operation.id.clone(),
                kind: operation.kind.clone(),
                status: OutcomeStatus::Success,
                data: Some(data),
                error: None,
                processing_time_ms,
            },
            Err(err) => {
                debug!("Batch operation {} failed: {}", operation.id, err);
                BatchOutcome {
                    id: operation.id.clone(),
                    kind: operation.kind.clone(),
                    status: OutcomeStatus::Error,
                    data: None,
                    error: Some(OutcomeError::from(&err)),
                    processing_time_ms,
                }
            }
        }
    }

    pub async fn process(&self, request: &BatchRequest) -> Result<BatchResult> {
        self.validate(request)?;
        let _job = ActiveJob::enter(&self.active_jobs);

        let started = Instant::now();
        let operations = &request.operations;
        let total = operations.len();
        let batch_size = self.effective_batch_size(request.options.batch_size, total);
        let fail_fast = request.options.fail_fast.unwrap_or(false);

        info!(
            "Processing batch of {} operations in groups of {} (fail_fast={})",
            total, batch_size, fail_fast
        );

        let mut results: Vec<BatchOutcome> = Vec::with_capacity(total);
        let mut short_circuited = false;

        for (index, group) in operations.chunks(batch_size).enumerate() {
            let outcomes = join_all(group.iter().map(|op| self.run_operation(op))).await;
            let group_failed = outcomes.iter().any(|o| !o.is_success());
            results.extend(outcomes);

            if fail_fast && group_failed && results.len() < total {
                warn!(
                    "Batch group {} had failures, skipping {} remaining operations",
                    index,
                    total - results.len()
                );
                short_circuited = true;
                break;
            }
        }

        let successful = results.iter().filter(|o| o.is_success()).count();
        let processed = results.len();
        let summary = BatchSummary {
            total_operations: total,
            processed,
            successful,
            failed: processed - successful,
            skipped: total - processed,
            batch_size,
            fail_fast,
            processing_time_ms: started.elapsed().as_millis() as u64,
            short_circuited,
        };

        info!(
            "Batch finished: {}/{} succeeded in {}ms",
            summary.successful, total, summary.processing_time_ms
        );

        Ok(BatchResult { results, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::MonitoringConfig;
    use crate::geocoding::GeocodingService;
    use crate::models::{Coordinate, ProximitySummary, ReferenceSystem};
    use crate::store::fixtures;
    use crate::transform::{CoordinateTransform, TerritoryBounds};
    use chrono::TimeDelta;
    use serde_json::json;

    /// Answers proximity requests without a datastore. An address of
    /// "fail" produces an error.
    #[derive(Default)]
    struct CountingDispatch {
        proximity_calls: AtomicUsize,
        other_calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl SpatialDispatch for CountingDispatch {
        async fn proximity(&self, request: &ProximityRequest) -> Result<ProximityResult> {
            self.proximity_calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if request.address.as_deref() == Some("fail") {
                return Err(SpatialError::GeocodingFailed("no match".to_string()));
            }
            Ok(ProximityResult {
                center: Coordinate::new(-37.8, 144.9, ReferenceSystem::Gda2020),
                radius_meters: 1000.0,
                results: Vec::new(),
                summary: ProximitySummary {
                    count: 0,
                    average_distance: 0.0,
                    elapsed_ms: 0,
                },
            })
        }

        async fn boundary(&self, _request: &BoundaryRequest) -> Result<BoundaryResult> {
            self.other_calls.fetch_add(1, Ordering::SeqCst);
            Err(SpatialError::UnsupportedOperation("boundary".to_string()))
        }

        async fn statistical(
            &self,
            _request: &StatisticalRequest,
        ) -> Result<StatisticalClassification> {
            self.other_calls.fetch_add(1, Ordering::SeqCst);
            Err(SpatialError::UnsupportedOperation("statistical".to_string()))
        }
    }

    fn limits() -> BatchConfig {
        BatchConfig {
            default_size: 10,
            max_size: 50,
            max_operations: 1000,
        }
    }

    fn proximity_op(id: &str, address: &str) -> BatchOperation {
        BatchOperation::new(id, "proximity", json!({ "address": address }))
    }

    fn counting() -> (Arc<CountingDispatch>, BatchSpatialService) {
        let dispatch = Arc::new(CountingDispatch::default());
        let service = BatchSpatialService::new(dispatch.clone(), limits());
        (dispatch, service)
    }

    #[tokio::test]
    async fn test_groups_run_every_operation_in_order() {
        let (dispatch, service) = counting();
        let operations: Vec<BatchOperation> = (0..25)
            .map(|i| proximity_op(&format!("op-{i}"), "somewhere"))
            .collect();
        let request = BatchRequest {
            operations,
            options: BatchOptions {
                batch_size: Some(10),
                fail_fast: None,
            },
        };

        let result = service.process(&request).await.unwrap();

        assert_eq!(dispatch.proximity_calls.load(Ordering::SeqCst), 25);
        assert_eq!(dispatch.max_in_flight.load(Ordering::SeqCst), 10);
        assert_eq!(result.results.len(), 25);
        for (i, outcome) in result.results.iter().enumerate() {
            assert_eq!(outcome.id, format!("op-{i}"));
            assert!(outcome.is_success());
        }
        assert_eq!(result.summary.batch_size, 10);
        assert_eq!(result.summary.successful, 25);
        assert!(!result.summary.short_circuited);
        assert_eq!(service.active_jobs(), 0);
    }

    #[tokio::test]
    async fn test_fail_fast_returns_prefix() {
        let (dispatch, service) = counting();
        let request = BatchRequest {
            operations: vec![proximity_op("a", "fail"), proximity_op("b", "fine")],
            options: BatchOptions {
                batch_size: Some(1),
                fail_fast: Some(true),
            },
        };

        let result = service.process(&request).await.unwrap();

        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].id, "a");
        assert_eq!(result.results[0].status, OutcomeStatus::Error);
        assert_eq!(dispatch.proximity_calls.load(Ordering::SeqCst), 1);
        assert!(result.summary.short_circuited);
        assert_eq!(result.summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_group_siblings() {
        let (dispatch, service) = counting();
        let request = BatchRequest {
            operations: vec![
                proximity_op("a", "fail"),
                proximity_op("b", "fine"),
                proximity_op("c", "fine"),
            ],
            options: BatchOptions {
                batch_size: Some(3),
                fail_fast: Some(true),
            },
        };

        let result = service.process(&request).await.unwrap();
        assert_eq!(dispatch.proximity_calls.load(Ordering::SeqCst), 3);
        let statuses: Vec<OutcomeStatus> = result.results.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                OutcomeStatus::Error,
                OutcomeStatus::Success,
                OutcomeStatus::Success
            ]
        );
        // Nothing left to skip after the only group
        assert!(!result.summary.short_circuited);
        assert_eq!(result.summary.failed, 1);
    }

    #[tokio::test]
    async fn test_unknown_kind_and_bad_parameters_are_outcomes() {
        let (dispatch, service) = counting();
        let request = BatchRequest {
            operations: vec![
                BatchOperation::new("x", "isochrone", json!({})),
                BatchOperation::new("y", "boundary", json!({ "coordinates": "nope" })),
            ],
            options: BatchOptions::default(),
        };

        let result = service.process(&request).await.unwrap();
        let kinds: Vec<ErrorKind> = result
            .results
            .iter()
            .map(|o| o.error.as_ref().unwrap().kind)
            .collect();
        assert_eq!(
            kinds,
            vec![ErrorKind::UnsupportedOperation, ErrorKind::InvalidInput]
        );
        assert_eq!(dispatch.other_calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.summary.batch_size, 2);
    }

    #[tokio::test]
    async fn test_rejects_malformed_batches() {
        let (_, service) = counting();
        let empty = BatchRequest {
            operations: Vec::new(),
            options: BatchOptions::default(),
        };
        assert_eq!(
            service.process(&empty).await.unwrap_err().kind(),
            ErrorKind::InvalidInput
        );

        let duplicate = BatchRequest {
            operations: vec![proximity_op("a", "x"), proximity_op("a", "y")],
            options: BatchOptions::default(),
        };
        assert!(service.process(&duplicate).await.is_err());

        let blank = BatchRequest {
            operations: vec![proximity_op(" ", "x")],
            options: BatchOptions::default(),
        };
        assert!(service.process(&blank).await.is_err());
    }

    #[test]
    fn test_effective_batch_size() {
        let (_, service) = counting();
        assert_eq!(service.effective_batch_size(None, 100), 10);
        assert_eq!(service.effective_batch_size(Some(0), 100), 1);
        assert_eq!(service.effective_batch_size(Some(500), 100), 50);
        assert_eq!(service.effective_batch_size(Some(20), 3), 3);
    }

    #[tokio::test]
    async fn test_service_dispatch_against_gazetteer() {
        let store = Arc::new(fixtures::store());
        let clock = Arc::new(ManualClock::default());
        let transform =
            CoordinateTransform::new(TerritoryBounds::default(), ReferenceSystem::Gda2020);
        let geocoder = Arc::new(GeocodingService::new(store.clone(), transform));
        let analytics = Arc::new(SpatialAnalyticsService::new(
            store.clone(),
            geocoder.clone(),
            transform,
        ));
        let boundary = Arc::new(BoundaryService::new(
            store.clone(),
            transform,
            Arc::new(crate::boundary::BoundaryCache::new(
                "boundary",
                TimeDelta::seconds(60),
                10,
                clock.clone(),
            )),
            4,
            clock.clone(),
        ));
        let statistical = Arc::new(StatisticalAreaService::new(
            store.clone(),
            geocoder,
            transform,
            Arc::new(crate::statistical::StatisticalCache::new(
                "statistical",
                TimeDelta::seconds(60),
                10,
                clock.clone(),
            )),
            4,
        ));
        let monitor = Arc::new(PerformanceMonitor::new(
            &MonitoringConfig::default(),
            store.clone(),
            Vec::new(),
            clock,
        ));
        let service = BatchSpatialService::new(
            Arc::new(ServiceDispatch::new(
                analytics,
                boundary,
                statistical,
                monitor.clone(),
            )),
            limits(),
        );

        let point = json!({ "coordinates": { "latitude": -37.8136, "longitude": 144.9631 } });
        let request = BatchRequest {
            operations: vec![
                BatchOperation::new("p", "proximity", point.clone()),
                BatchOperation::new("b", "boundary", point.clone()),
                BatchOperation::new("s", "statistical", point),
                BatchOperation::new(
                    "miss",
                    "boundary",
                    json!({ "coordinates": { "latitude": -38.15, "longitude": 144.35 } }),
                ),
            ],
            options: BatchOptions::default(),
        };

        let result = service.process(&request).await.unwrap();
        assert_eq!(result.summary.successful, 3);
        assert_eq!(result.summary.failed, 1);
        match &result.results[1].data {
            Some(OperationData::Boundary(b)) => assert_eq!(b.locality.name, "MELBOURNE"),
            other => panic!("unexpected data {other:?}"),
        }
        assert_eq!(
            result.results[3].error.as_ref().unwrap().kind,
            ErrorKind::NotFound
        );

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["summary"]["totalOperations"], 4);
        assert_eq!(json["results"][0]["status"], "success");

        let stats = monitor.current_statistics();
        assert_eq!(stats.sample_count, 4);
        assert_eq!(stats.error_rate, 0.25);
    }
}
