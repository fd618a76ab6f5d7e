use anyhow::{bail, Context, Result};
use chrono::TimeDelta;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::ReferenceSystem;
use crate::monitoring::AlertThresholds;
use crate::transform::TerritoryBounds;

/// Longest accepted duration for any configured interval, about a century.
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

fn clamped_seconds(secs: u64) -> TimeDelta {
    TimeDelta::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

fn check_duration(field: &str, secs: Option<u64>) -> Result<()> {
    match secs {
        Some(secs) if secs <= MAX_DURATION_SECS => Ok(()),
        _ => bail!("{} is out of range (at most {} seconds)", field, MAX_DURATION_SECS),
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub datastore: DatastoreConfig,
    pub territory: TerritoryBounds,
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatastoreConfig {
    /// JSON gazetteer extract loaded by the in-memory store.
    pub dataset: Option<PathBuf>,
    pub native_system: String,
    pub max_connections: usize,
    pub slow_query_ms: u64,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            dataset: None,
            native_system: "GDA2020".to_string(),
            max_connections: 20,
            slow_query_ms: 1000,
        }
    }
}

impl DatastoreConfig {
    pub fn native_system(&self) -> Result<ReferenceSystem> {
        ReferenceSystem::parse(&self.native_system)
            .with_context(|| format!("Invalid datastore native_system '{}'", self.native_system))
    }

    pub fn slow_query(&self) -> Duration {
        Duration::from_millis(self.slow_query_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    /// Decimal places kept when quantizing coordinates into cache keys.
    pub precision: u32,
    /// Entries per cache tier.
    pub capacity: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> TimeDelta {
        clamped_seconds(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            precision: 4,
            capacity: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BatchConfig {
    pub default_size: usize,
    pub max_size: usize,
    pub max_operations: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_size: 10,
            max_size: 50,
            max_operations: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitoringConfig {
    pub buffer_capacity: usize,
    pub evaluation_interval_secs: u64,
    pub alert_retention_hours: u64,
    /// Trailing window used for alert evaluation and health statistics.
    pub window_secs: u64,
    pub thresholds: AlertThresholds,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 10_000,
            evaluation_interval_secs: 60,
            alert_retention_hours: 24,
            window_secs: 300,
            thresholds: AlertThresholds::default(),
        }
    }
}

impl MonitoringConfig {
    pub fn window(&self) -> TimeDelta {
        clamped_seconds(self.window_secs)
    }

    pub fn alert_retention(&self) -> TimeDelta {
        clamped_seconds(self.alert_retention_hours.saturating_mul(3600))
    }

    /// Evaluation period, never shorter than a second.
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs.clamp(1, MAX_DURATION_SECS))
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject durations that cannot be represented as timestamp offsets.
    pub fn validate(&self) -> Result<()> {
        check_duration("cache.ttl_secs", Some(self.cache.ttl_secs))?;
        let monitoring = &self.monitoring;
        check_duration("monitoring.window_secs", Some(monitoring.window_secs))?;
        check_duration(
            "monitoring.evaluation_interval_secs",
            Some(monitoring.evaluation_interval_secs),
        )?;
        check_duration(
            "monitoring.alert_retention_hours",
            monitoring.alert_retention_hours.checked_mul(3600),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_complete() {
        let config = Config::default();
        assert_eq!(config.server.listen, "0.0.0.0:3000");
        assert_eq!(
            config.datastore.native_system().unwrap(),
            ReferenceSystem::Gda2020
        );
        assert_eq!(config.cache.precision, 4);
        assert_eq!(config.batch.max_size, 50);
        assert_eq!(config.territory.min_latitude, -45.0);
        assert_eq!(config.monitoring.thresholds.error_rate.critical, 0.25);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[datastore]
dataset = "/data/gnaf-vic.json"
native_system = "GDA94"

[batch]
max_size = 20

[monitoring.thresholds.response_time_ms]
warning = 250.0
error = 750.0
critical = 1500.0
"#
        )
        .unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(
            config.datastore.dataset.as_deref(),
            Some(Path::new("/data/gnaf-vic.json"))
        );
        assert_eq!(
            config.datastore.native_system().unwrap(),
            ReferenceSystem::Gda94
        );
        assert_eq!(config.datastore.max_connections, 20);
        assert_eq!(config.batch.max_size, 20);
        assert_eq!(config.batch.default_size, 10);
        assert_eq!(config.monitoring.thresholds.response_time_ms.warning, 250.0);
        assert_eq!(config.monitoring.thresholds.error_rate.warning, 0.05);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[cache]\nttl_secs = \"soon\"\n").unwrap();
        assert!(Config::load_from_file(file.path()).is_err());

        let config: Config = toml::from_str("[datastore]\nnative_system = \"NAD83\"").unwrap();
        assert!(config.datastore.native_system().is_err());
    }

    #[test]
    fn test_out_of_range_durations_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[cache]\nttl_secs = 9223372036854775807\n").unwrap();
        let err = Config::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("cache.ttl_secs"));

        let mut config = Config::default();
        config.monitoring.alert_retention_hours = u64::MAX / 2;
        assert!(config.validate().is_err());
        assert_eq!(
            config.monitoring.alert_retention().num_seconds() as u64,
            MAX_DURATION_SECS
        );

        config.monitoring.alert_retention_hours = 24;
        config.monitoring.evaluation_interval_secs = 0;
        assert!(config.validate().is_ok());
        assert_eq!(config.monitoring.evaluation_interval(), Duration::from_secs(1));
        assert_eq!(config.cache.ttl(), TimeDelta::hours(1));
    }
}
