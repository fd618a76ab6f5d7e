//! Explicit wiring of every service around one datastore handle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::analytics::{ProximityRequest, SpatialAnalyticsService};
use crate::batch::{BatchRequest, BatchResult, BatchSpatialService, ServiceDispatch};
use crate::boundary::{BoundaryCache, BoundaryRequest, BoundaryService};
use crate::cache::CacheStatsSource;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::Result;
use crate::geocoding::{
    GeocodeRequest, GeocodeResult, GeocodingService, ReverseGeocodeResult, ReverseRequest,
};
use crate::models::{BoundaryResult, ProximityResult, StatisticalClassification};
use crate::monitoring::{Alert, HealthReport, PerformanceMonitor, PerformanceStatistics};
use crate::statistical::{StatisticalAreaService, StatisticalCache, StatisticalRequest};
use crate::store::GazetteerStore;
use crate::transform::CoordinateTransform;

pub struct SpatialServices {
    store: Arc<dyn GazetteerStore>,
    geocoding: Arc<GeocodingService>,
    analytics: Arc<SpatialAnalyticsService>,
    boundary: Arc<BoundaryService>,
    statistical: Arc<StatisticalAreaService>,
    batch: BatchSpatialService,
    monitor: Arc<PerformanceMonitor>,
    evaluation_interval: Duration,
}

impl SpatialServices {
    pub fn new(config: &Config, store: Arc<dyn GazetteerStore>, clock: Arc<dyn Clock>) -> Self {
        let transform = CoordinateTransform::new(config.territory, store.native_system());
        let ttl = config.cache.ttl();

        let boundary_cache = Arc::new(BoundaryCache::new(
            "boundary",
            ttl,
            config.cache.capacity,
            clock.clone(),
        ));
        let statistical_cache = Arc::new(StatisticalCache::new(
            "statistical",
            ttl,
            config.cache.capacity,
            clock.clone(),
        ));

        let geocoding = Arc::new(GeocodingService::new(store.clone(), transform));
        let analytics = Arc::new(SpatialAnalyticsService::new(
            store.clone(),
            geocoding.clone(),
            transform,
        ));
        let boundary = Arc::new(BoundaryService::new(
            store.clone(),
            transform,
            boundary_cache.clone(),
            config.cache.precision,
            clock.clone(),
        ));
        let statistical = Arc::new(StatisticalAreaService::new(
            store.clone(),
            geocoding.clone(),
            transform,
            statistical_cache.clone(),
            config.cache.precision,
        ));

        let boundary_stats: Arc<dyn CacheStatsSource> = boundary_cache;
        let statistical_stats: Arc<dyn CacheStatsSource> = statistical_cache;
        let monitor = Arc::new(PerformanceMonitor::new(
            &config.monitoring,
            store.clone(),
            vec![boundary_stats, statistical_stats],
            clock,
        ));

        // Batch members are sampled individually through the same monitor
        let dispatch = Arc::new(ServiceDispatch::new(
            analytics.clone(),
            boundary.clone(),
            statistical.clone(),
            monitor.clone(),
        ));
        let batch = BatchSpatialService::new(dispatch, config.batch.clone());

        Self {
            store,
            geocoding,
            analytics,
            boundary,
            statistical,
            batch,
            monitor,
            evaluation_interval: config.monitoring.evaluation_interval(),
        }
    }

    pub fn store(&self) -> &Arc<dyn GazetteerStore> {
        &self.store
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn active_batches(&self) -> usize {
        self.batch.active_jobs()
    }

    /// Start periodic alert evaluation at the configured interval.
    pub fn start_monitoring(&self) -> tokio::task::JoinHandle<()> {
        self.monitor.spawn_evaluation_loop(self.evaluation_interval)
    }

    async fn observe<T, F>(&self, operation: &str, call: F, cache_hit: fn(&T) -> bool) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.monitor.observe(operation, call, cache_hit).await
    }

    pub async fn geocode(&self, request: &GeocodeRequest) -> Result<GeocodeResult> {
        self.observe("geocode", self.geocoding.geocode(request), |_| false)
            .await
    }

    pub async fn reverse_geocode(&self, request: &ReverseRequest) -> Result<ReverseGeocodeResult> {
        self.observe(
            "reverse_geocode",
            self.geocoding.reverse_geocode(request),
            |_| false,
        )
        .await
    }

    pub async fn proximity(&self, request: &ProximityRequest) -> Result<ProximityResult> {
        self.observe("proximity", self.analytics.proximity(request), |_| false)
            .await
    }

    pub async fn boundary(&self, request: &BoundaryRequest) -> Result<BoundaryResult> {
        self.observe("boundary", self.boundary.lookup(request), |r| {
            r.metadata.cached
        })
        .await
    }

    pub async fn statistical(
        &self,
        request: &StatisticalRequest,
    ) -> Result<StatisticalClassification> {
        self.observe("statistical", self.statistical.classify(request), |r| {
            r.metadata.cached
        })
        .await
    }

    pub async fn batch(&self, request: &BatchRequest) -> Result<BatchResult> {
        self.observe("batch", self.batch.process(request), |_| false)
            .await
    }

    pub fn health_report(&self) -> HealthReport {
        self.monitor.health_report()
    }

    pub fn statistics(&self) -> PerformanceStatistics {
        self.monitor.current_statistics()
    }

    pub fn resolve_alert(&self, id: &str) -> Result<Alert> {
        self.monitor.resolve_alert(id)
    }
}
