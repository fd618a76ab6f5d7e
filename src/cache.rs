//! TTL cache keyed by quantized coordinates.
//!
//! Shared by every caller of a service. Reads and read-through writes are
//! not serialised against each other: two concurrent misses on one key may
//! both reach the datastore, and the later write wins. Values are pure
//! functions of the key so that is only wasted work.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::models::Coordinate;

/// Coordinate rounded to a fixed number of decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinateKey {
    latitude: i64,
    longitude: i64,
    precision: u32,
}

impl CoordinateKey {
    pub fn quantize(coord: &Coordinate, precision: u32) -> Self {
        let scale = 10f64.powi(precision as i32);
        Self {
            latitude: (coord.latitude * scale).round() as i64,
            longitude: (coord.longitude * scale).round() as i64,
            precision,
        }
    }
}

impl std::fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scale = 10f64.powi(self.precision as i32);
        write!(
            f,
            "{:.*},{:.*}",
            self.precision as usize,
            self.latitude as f64 / scale,
            self.precision as usize,
            self.longitude as f64 / scale
        )
    }
}

/// Point-in-time counters for one cache tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub tier: String,
    pub entries: usize,
    pub capacity: usize,
    pub ttl_secs: i64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_ratio: f64,
}

/// Read-only view the monitoring service polls.
pub trait CacheStatsSource: Send + Sync {
    fn cache_stats(&self) -> CacheStats;
}

struct Entry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

pub struct TtlCache<K, V> {
    tier: String,
    entries: Mutex<HashMap<K, Entry<V>>>,
    ttl: TimeDelta,
    capacity: usize,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Display,
    V: Clone,
{
    pub fn new(tier: &str, ttl: TimeDelta, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            tier: tier.to_string(),
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Fresh value for `key`, if any. Expired entries are dropped on sight.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let fresh = match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        };

        if fresh.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        fresh
    }

    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let before = entries.len();
            entries.retain(|_, entry| entry.expires_at > now);

            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }

            let evicted = (before - entries.len()) as u64;
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
        }

        entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Read-through lookup. Returns the value and whether it came from the
    /// cache. Loader errors are passed through and nothing is stored.
    ///
    /// The lock is released while `load` runs.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, load: F) -> Result<(V, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            debug!("{} cache hit for {}", self.tier, key);
            return Ok((value, true));
        }

        debug!("{} cache miss for {}", self.tier, key);
        let value = load().await?;
        self.insert(key, value.clone());
        Ok((value, false))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<K, V> CacheStatsSource for TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Display + Send,
    V: Clone + Send,
{
    fn cache_stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            tier: self.tier.clone(),
            entries: self.len(),
            capacity: self.capacity,
            ttl_secs: self.ttl.num_seconds(),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_ratio: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}
