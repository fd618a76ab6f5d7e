//! Latency sampling, threshold alerts and the health snapshot.

mod alerts;
mod samples;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, CacheStatsSource};
use crate::clock::Clock;
use crate::config::MonitoringConfig;
use crate::error::{Result, SpatialError};
use crate::store::{GazetteerStore, StoreMetrics};

pub use alerts::{Alert, AlertCategory, AlertThresholds, Severity, ThresholdTiers};
pub use samples::{
    percentile, OperationBreakdown, OutcomeClass, PerformanceSample, PerformanceStatistics,
    SampleBuffer, TOP_OPERATIONS,
};

/// Alerts newer than this many seconds count towards health status.
pub const HEALTH_ALERT_WINDOW_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub datastore: StoreMetrics,
    pub cache: Vec<CacheStats>,
    pub performance: PerformanceStatistics,
    pub alerts: Vec<Alert>,
}

pub struct PerformanceMonitor {
    samples: Mutex<SampleBuffer>,
    alerts: RwLock<Vec<Alert>>,
    store: Arc<dyn GazetteerStore>,
    caches: Vec<Arc<dyn CacheStatsSource>>,
    clock: Arc<dyn Clock>,
    thresholds: AlertThresholds,
    window: TimeDelta,
    retention: TimeDelta,
}

impl PerformanceMonitor {
    pub fn new(
        config: &MonitoringConfig,
        store: Arc<dyn GazetteerStore>,
        caches: Vec<Arc<dyn CacheStatsSource>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            samples: Mutex::new(SampleBuffer::new(config.buffer_capacity)),
            alerts: RwLock::new(Vec::new()),
            store,
            caches,
            clock,
            thresholds: config.thresholds.clone(),
            window: config.window(),
            retention: config.alert_retention(),
        }
    }

    pub fn record(&self, sample: PerformanceSample) {
        self.samples.lock().push(sample);
    }

    /// Record a completed call timestamped now.
    pub fn record_operation(
        &self,
        operation: &str,
        latency: Duration,
        outcome: OutcomeClass,
        cache_hit: bool,
    ) {
        self.record(PerformanceSample {
            timestamp: self.clock.now(),
            operation: operation.to_string(),
            latency_ms: latency.as_secs_f64() * 1000.0,
            outcome,
            cache_hit,
        });
    }

    /// Await `call` and record its latency and outcome under `operation`.
    pub async fn observe<T, F>(
        &self,
        operation: &str,
        call: F,
        cache_hit: fn(&T) -> bool,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = call.await;
        let (outcome, hit) = match &result {
            Ok(value) => (OutcomeClass::Success, cache_hit(value)),
            Err(err) => (OutcomeClass::Error(err.kind()), false),
        };
        self.record_operation(operation, started.elapsed(), outcome, hit);
        result
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn statistics(&self, window: TimeDelta) -> PerformanceStatistics {
        let now = self.clock.now();
        self.samples.lock().statistics(now, window)
    }

    /// Statistics over the configured evaluation window.
    pub fn current_statistics(&self) -> PerformanceStatistics {
        self.statistics(self.window)
    }

    pub fn cache_stats(&self) -> Vec<CacheStats> {
        self.caches.iter().map(|c| c.cache_stats()).collect()
    }

    /// Hit ratio across every cache tier, `None` before the first lookup.
    fn combined_cache_hit_ratio(&self) -> Option<f64> {
        let (hits, lookups) = self
            .cache_stats()
            .iter()
            .fold((0u64, 0u64), |(h, l), s| (h + s.hits, l + s.hits + s.misses));
        (lookups > 0).then(|| hits as f64 / lookups as f64)
    }

    /// Check every threshold against the current window and append the
    /// alerts that fire. Returns the newly raised alerts.
    pub fn evaluate_alerts(&self) -> Vec<Alert> {
        let now = self.clock.now();
        let stats = self.current_statistics();
        let t = &self.thresholds;
        let mut raised = Vec::new();

        let mut check = |category: AlertCategory, hit: Option<(Severity, f64)>, observed: f64| {
            if let Some((severity, threshold)) = hit {
                raised.push(Alert::new(category, severity, threshold, observed, now));
            }
        };

        if stats.sample_count > 0 {
            check(
                AlertCategory::ResponseTime,
                t.response_time_ms.exceeded(stats.p95_latency_ms),
                stats.p95_latency_ms,
            );
            check(
                AlertCategory::ErrorRate,
                t.error_rate.exceeded(stats.error_rate),
                stats.error_rate,
            );
            check(
                AlertCategory::Throughput,
                t.throughput_floor.fallen_below(stats.throughput_per_second),
                stats.throughput_per_second,
            );
        }

        let saturation = self.store.metrics().pool_saturation();
        check(
            AlertCategory::PoolSaturation,
            t.pool_saturation.exceeded(saturation),
            saturation,
        );

        if let Some(ratio) = self.combined_cache_hit_ratio() {
            check(
                AlertCategory::CacheHitRatio,
                t.cache_hit_floor.fallen_below(ratio),
                ratio,
            );
        }

        let mut alerts = self.alerts.write();
        let cutoff = now - self.retention;
        let before = alerts.len();
        alerts.retain(|a| a.created_at >= cutoff);
        if alerts.len() < before {
            debug!("Pruned {} expired alerts", before - alerts.len());
        }
        for alert in &raised {
            warn!("[{}] {}", alert.severity.as_str(), alert.message);
        }
        alerts.extend(raised.iter().cloned());
        raised
    }

    /// Mark an alert resolved. Resolving an already resolved alert is a no-op.
    pub fn resolve_alert(&self, id: &str) -> Result<Alert> {
        let now = self.clock.now();
        let mut alerts = self.alerts.write();
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| SpatialError::AlertNotFound(id.to_string()))?;
        if !alert.resolved {
            alert.resolved = true;
            alert.resolved_at = Some(now);
            info!("Resolved alert {}", id);
        }
        Ok(alert.clone())
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().clone()
    }

    /// Unresolved alerts created within `within` of now.
    pub fn unresolved_alerts(&self, within: TimeDelta) -> Vec<Alert> {
        let since = self.clock.now() - within;
        self.alerts
            .read()
            .iter()
            .filter(|a| !a.resolved && a.created_at >= since)
            .cloned()
            .collect()
    }

    pub fn health_report(&self) -> HealthReport {
        let alerts = self.unresolved_alerts(TimeDelta::seconds(HEALTH_ALERT_WINDOW_SECS));
        let status = if alerts.iter().any(|a| a.severity == Severity::Critical) {
            HealthStatus::Unhealthy
        } else if !alerts.is_empty() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            timestamp: self.clock.now(),
            datastore: self.store.metrics(),
            cache: self.cache_stats(),
            performance: self.current_statistics(),
            alerts,
        }
    }

    /// Evaluate alerts every `period` until the handle is aborted.
    pub fn spawn_evaluation_loop(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let raised = monitor.evaluate_alerts();
                if !raised.is_empty() {
                    debug!("Alert evaluation raised {} alerts", raised.len());
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CoordinateKey, TtlCache};
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;
    use crate::models::{Coordinate, ReferenceSystem};
    use crate::store::fixtures;

    fn config() -> MonitoringConfig {
        MonitoringConfig {
            window_secs: 10,
            ..Default::default()
        }
    }

    fn monitor_with(
        clock: Arc<ManualClock>,
        caches: Vec<Arc<dyn CacheStatsSource>>,
    ) -> PerformanceMonitor {
        PerformanceMonitor::new(&config(), Arc::new(fixtures::store()), caches, clock)
    }

    fn record_many(monitor: &PerformanceMonitor, count: usize, latency_ms: u64, ok: bool) {
        for _ in 0..count {
            let outcome = if ok {
                OutcomeClass::Success
            } else {
                OutcomeClass::Error(ErrorKind::DependencyFailure)
            };
            monitor.record_operation(
                "geocode",
                Duration::from_millis(latency_ms),
                outcome,
                false,
            );
        }
    }

    #[test]
    fn test_quiet_service_raises_nothing() {
        let monitor = monitor_with(Arc::new(ManualClock::default()), Vec::new());
        assert!(monitor.evaluate_alerts().is_empty());
        assert_eq!(monitor.health_report().status, HealthStatus::Healthy);
    }

    #[test]
    fn test_slow_p95_raises_single_tier() {
        let monitor = monitor_with(Arc::new(ManualClock::default()), Vec::new());
        record_many(&monitor, 20, 1500, true);

        let raised = monitor.evaluate_alerts();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].category, AlertCategory::ResponseTime);
        assert_eq!(raised[0].severity, Severity::Error);
        assert_eq!(raised[0].threshold_value, 1000.0);

        // Not de-duplicated by content
        monitor.evaluate_alerts();
        assert_eq!(monitor.alerts().len(), 2);
        assert_eq!(monitor.health_report().status, HealthStatus::Degraded);
    }

    #[test]
    fn test_error_rate_critical_marks_unhealthy() {
        let monitor = monitor_with(Arc::new(ManualClock::default()), Vec::new());
        record_many(&monitor, 14, 5, true);
        record_many(&monitor, 6, 5, false);

        let raised = monitor.evaluate_alerts();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].category, AlertCategory::ErrorRate);
        assert_eq!(raised[0].severity, Severity::Critical);
        assert_eq!(monitor.health_report().status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_resolve_alert() {
        let monitor = monitor_with(Arc::new(ManualClock::default()), Vec::new());
        record_many(&monitor, 20, 700, true);
        let id = monitor.evaluate_alerts()[0].id.clone();

        let err = monitor.resolve_alert("missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let resolved = monitor.resolve_alert(&id).unwrap();
        assert!(resolved.resolved);
        let again = monitor.resolve_alert(&id).unwrap();
        assert_eq!(again.resolved_at, resolved.resolved_at);
        assert!(monitor
            .unresolved_alerts(TimeDelta::seconds(HEALTH_ALERT_WINDOW_SECS))
            .is_empty());
        assert_eq!(monitor.health_report().status, HealthStatus::Healthy);
    }

    #[test]
    fn test_alerts_age_out() {
        let clock = Arc::new(ManualClock::default());
        let monitor = monitor_with(clock.clone(), Vec::new());
        record_many(&monitor, 20, 700, true);
        monitor.evaluate_alerts();

        clock.advance(TimeDelta::hours(2));
        assert!(monitor
            .unresolved_alerts(TimeDelta::seconds(HEALTH_ALERT_WINDOW_SECS))
            .is_empty());
        assert_eq!(monitor.alerts().len(), 1);

        clock.advance(TimeDelta::hours(23));
        assert!(monitor.evaluate_alerts().is_empty());
        assert!(monitor.alerts().is_empty());
    }

    #[test]
    fn test_cache_hit_floor() {
        let clock = Arc::new(ManualClock::default());
        let cache: Arc<TtlCache<CoordinateKey, u8>> = Arc::new(TtlCache::new(
            "boundary",
            TimeDelta::seconds(60),
            10,
            clock.clone(),
        ));
        let key = CoordinateKey::quantize(
            &Coordinate::new(-37.8, 144.9, ReferenceSystem::Gda2020),
            4,
        );
        cache.get(&key);
        cache.get(&key);

        let source: Arc<dyn CacheStatsSource> = cache;
        let monitor = monitor_with(clock, vec![source]);
        let raised = monitor.evaluate_alerts();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].category, AlertCategory::CacheHitRatio);
        assert_eq!(raised[0].severity, Severity::Critical);

        let report = monitor.health_report();
        assert_eq!(report.cache[0].misses, 2);
        assert_eq!(report.datastore.max_connections, 20);
    }

    #[tokio::test]
    async fn test_evaluation_loop_runs() {
        let monitor = Arc::new(monitor_with(Arc::new(ManualClock::default()), Vec::new()));
        record_many(&monitor, 20, 3000, true);

        let handle = monitor.spawn_evaluation_loop(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(!monitor.alerts().is_empty());
        assert!(monitor
            .alerts()
            .iter()
            .all(|a| a.severity == Severity::Critical));
    }

    #[tokio::test]
    async fn test_observe_records_outcome() {
        let monitor = monitor_with(Arc::new(ManualClock::default()), Vec::new());
        let ok = monitor
            .observe("boundary", async { Ok::<u8, SpatialError>(1) }, |v| *v == 1)
            .await;
        assert_eq!(ok.unwrap(), 1);
        let err = monitor
            .observe(
                "boundary",
                async { Err::<u8, SpatialError>(SpatialError::MissingLocation) },
                |_| false,
            )
            .await;
        assert!(err.is_err());

        let stats = monitor.current_statistics();
        assert_eq!(stats.sample_count, 2);
        assert_eq!(stats.error_rate, 0.5);
        assert_eq!(stats.cache_hit_ratio, 0.5);
    }
}
