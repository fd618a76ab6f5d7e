//! Threshold tiers and the alerts they raise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    ResponseTime,
    ErrorRate,
    Throughput,
    PoolSaturation,
    CacheHitRatio,
}

impl AlertCategory {
    pub fn describe(&self) -> &'static str {
        match self {
            AlertCategory::ResponseTime => "p95 response time",
            AlertCategory::ErrorRate => "error rate",
            AlertCategory::Throughput => "throughput",
            AlertCategory::PoolSaturation => "connection pool saturation",
            AlertCategory::CacheHitRatio => "cache hit ratio",
        }
    }
}

/// Warning, error and critical levels for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTiers {
    pub warning: f64,
    pub error: f64,
    pub critical: f64,
}

impl ThresholdTiers {
    pub const fn new(warning: f64, error: f64, critical: f64) -> Self {
        Self {
            warning,
            error,
            critical,
        }
    }

    fn tiers(&self) -> [(Severity, f64); 3] {
        [
            (Severity::Critical, self.critical),
            (Severity::Error, self.error),
            (Severity::Warning, self.warning),
        ]
    }

    /// Highest tier strictly exceeded by `observed`.
    pub fn exceeded(&self, observed: f64) -> Option<(Severity, f64)> {
        self.tiers().into_iter().find(|(_, t)| observed > *t)
    }

    /// Highest tier `observed` has fallen strictly below, for floor metrics.
    pub fn fallen_below(&self, observed: f64) -> Option<(Severity, f64)> {
        self.tiers().into_iter().find(|(_, t)| observed < *t)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Milliseconds, compared against the p95 latency.
    pub response_time_ms: ThresholdTiers,
    pub error_rate: ThresholdTiers,
    /// Requests per second below which throughput alerts fire.
    pub throughput_floor: ThresholdTiers,
    pub pool_saturation: ThresholdTiers,
    pub cache_hit_floor: ThresholdTiers,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            response_time_ms: ThresholdTiers::new(500.0, 1000.0, 2000.0),
            error_rate: ThresholdTiers::new(0.05, 0.10, 0.25),
            throughput_floor: ThresholdTiers::new(1.0, 0.5, 0.1),
            pool_saturation: ThresholdTiers::new(0.70, 0.85, 0.95),
            cache_hit_floor: ThresholdTiers::new(0.50, 0.30, 0.10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub category: AlertCategory,
    pub severity: Severity,
    pub message: String,
    pub threshold_value: f64,
    pub observed_value: f64,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(
        category: AlertCategory,
        severity: Severity,
        threshold_value: f64,
        observed_value: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        let message = format!(
            "{} is {:.3} against a {} threshold of {:.3}",
            category.describe(),
            observed_value,
            severity.as_str(),
            threshold_value
        );
        Self {
            id: Uuid::new_v4().to_string(),
            category,
            severity,
            message,
            threshold_value,
            observed_value,
            created_at,
            resolved: false,
            resolved_at: None,
        }
    }
}
