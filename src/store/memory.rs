//! In-process gazetteer backed by R-tree indexes.
//!
//! Loads a JSON dataset of address points, locality polygons and
//! statistical-area polygons. Used by the query binary for local runs and
//! by the service tests.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use geo::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    AddressIndex, AddressRow, AddressTokens, AreaIndex, GazetteerQuery, GazetteerRow,
    GazetteerStore, LocalityRow, QueryKind, StatisticalAreaRow, StoreError, StoreMetrics,
};
use crate::geocoding::scoring::{rank_rows, MatchInput};
use crate::models::ReferenceSystem;

/// A locality row with its boundary ring as `[lon, lat]` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalityArea {
    #[serde(flatten)]
    pub row: LocalityRow,
    pub boundary: Vec<[f64; 2]>,
}

/// A statistical-area row with its boundary ring as `[lon, lat]` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalAreaPolygon {
    #[serde(flatten)]
    pub row: StatisticalAreaRow,
    pub boundary: Vec<[f64; 2]>,
}

/// On-disk layout of a gazetteer extract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GazetteerDataset {
    #[serde(default)]
    pub addresses: Vec<AddressRow>,
    #[serde(default)]
    pub localities: Vec<LocalityArea>,
    #[serde(default)]
    pub statistical_areas: Vec<StatisticalAreaPolygon>,
}

impl GazetteerDataset {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read gazetteer dataset")?;
        let dataset: GazetteerDataset =
            serde_json::from_str(&content).context("Failed to parse gazetteer dataset")?;
        Ok(dataset)
    }
}

fn ring_to_polygon(ring: &[[f64; 2]]) -> Option<Polygon<f64>> {
    let mut coords: Vec<Coord<f64>> = ring.iter().map(|&[x, y]| Coord { x, y }).collect();
    if coords.len() < 3 {
        return None;
    }
    // Close the ring if needed
    if coords.first() != coords.last() {
        coords.push(coords[0]);
    }
    Some(Polygon::new(LineString::new(coords), vec![]))
}

/// Tracks one in-flight query for the connection gauges.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MemoryGazetteer {
    addresses: Vec<AddressRow>,
    address_index: AddressIndex,
    localities: AreaIndex<LocalityRow>,
    statistical_areas: AreaIndex<StatisticalAreaRow>,
    native: ReferenceSystem,
    max_connections: usize,
    slow_query: Duration,
    in_flight: AtomicUsize,
    total_queries: AtomicU64,
    total_query_micros: AtomicU64,
    slow_queries: AtomicU64,
    per_kind: [AtomicU64; 4],
}

impl MemoryGazetteer {
    pub fn new(dataset: GazetteerDataset, native: ReferenceSystem) -> Self {
        let points: Vec<(f64, f64)> = dataset
            .addresses
            .iter()
            .map(|row| (row.longitude, row.latitude))
            .collect();
        let address_index = AddressIndex::build(&points, native);

        let localities = AreaIndex::build(
            dataset
                .localities
                .into_iter()
                .filter_map(|area| match ring_to_polygon(&area.boundary) {
                    Some(polygon) => Some((area.row, polygon)),
                    None => {
                        warn!("Skipping locality {} with degenerate boundary", area.row.id);
                        None
                    }
                })
                .collect(),
        );

        let statistical_areas = AreaIndex::build(
            dataset
                .statistical_areas
                .into_iter()
                .filter_map(|area| ring_to_polygon(&area.boundary).map(|p| (area.row, p)))
                .collect(),
        );

        info!(
            "Gazetteer ready: {} addresses, {} localities, {} statistical areas",
            dataset.addresses.len(),
            localities.len(),
            statistical_areas.len()
        );

        Self {
            addresses: dataset.addresses,
            address_index,
            localities,
            statistical_areas,
            native,
            max_connections: 20,
            slow_query: Duration::from_millis(1000),
            in_flight: AtomicUsize::new(0),
            total_queries: AtomicU64::new(0),
            total_query_micros: AtomicU64::new(0),
            slow_queries: AtomicU64::new(0),
            per_kind: Default::default(),
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P, native: ReferenceSystem) -> Result<Self> {
        Ok(Self::new(GazetteerDataset::load_from_file(path)?, native))
    }

    /// Pool size and slow-query threshold reported through [`StoreMetrics`].
    pub fn with_pool(mut self, max_connections: usize, slow_query: Duration) -> Self {
        self.max_connections = max_connections;
        self.slow_query = slow_query;
        self
    }

    /// Number of statements of `kind` executed so far.
    pub fn query_count(&self, kind: QueryKind) -> u64 {
        self.per_kind[kind.index()].load(Ordering::SeqCst)
    }

    /// Candidates matching the text or street, best match first.
    fn address_search(
        &self,
        text: &str,
        tokens: &AddressTokens,
        limit: usize,
    ) -> Vec<GazetteerRow> {
        let input = MatchInput::new(text.to_uppercase(), tokens.clone());
        let street = tokens.street_name.as_deref().map(str::to_uppercase);

        let candidates = self.addresses.iter().filter(|row| {
            let formatted = row.formatted_address.to_uppercase();
            formatted.contains(&input.text)
                || street.as_deref().is_some_and(|s| {
                    row.street_name.to_uppercase().contains(s) || formatted.contains(s)
                })
        });

        rank_rows(&input, candidates)
            .into_iter()
            .take(limit)
            .map(|(row, _, _)| GazetteerRow::Address(row.clone()))
            .collect()
    }

    fn within_radius(
        &self,
        query: &GazetteerQuery,
    ) -> Vec<GazetteerRow> {
        let GazetteerQuery::WithinRadius {
            center,
            radius_meters,
            limit,
            property_types,
        } = query
        else {
            return Vec::new();
        };

        // Nearest first, then most reliable, then id, before the limit applies
        let mut hits: Vec<(&AddressRow, f64)> = self
            .address_index
            .within_radius(center, *radius_meters)
            .into_iter()
            .map(|(row, distance)| (&self.addresses[row], distance))
            .filter(|(row, _)| match property_types {
                Some(types) => row
                    .property_type
                    .as_deref()
                    .is_some_and(|t| types.iter().any(|wanted| wanted.eq_ignore_ascii_case(t))),
                None => true,
            })
            .collect();
        hits.sort_by(|(a, da), (b, db)| {
            da.total_cmp(db)
                .then(a.reliability.cmp(&b.reliability))
                .then_with(|| a.id.cmp(&b.id))
        });

        hits.into_iter()
            .take(*limit)
            .map(|(row, _)| GazetteerRow::Address(row.clone()))
            .collect()
    }

    fn record(&self, kind: QueryKind, elapsed: Duration) {
        self.per_kind[kind.index()].fetch_add(1, Ordering::SeqCst);
        self.total_queries.fetch_add(1, Ordering::SeqCst);
        self.total_query_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::SeqCst);
        if elapsed >= self.slow_query {
            self.slow_queries.fetch_add(1, Ordering::SeqCst);
            warn!("Slow {} query took {:?}", kind.label(), elapsed);
        }
    }
}

#[async_trait]
impl GazetteerStore for MemoryGazetteer {
    fn native_system(&self) -> ReferenceSystem {
        self.native
    }

    async fn query(&self, query: &GazetteerQuery) -> Result<Vec<GazetteerRow>, StoreError> {
        let _guard = InFlight::enter(&self.in_flight);
        // Suspension point, as a networked store would have
        tokio::task::yield_now().await;

        let started = Instant::now();
        let rows = match query {
            GazetteerQuery::AddressSearch {
                text,
                tokens,
                limit,
            } => self.address_search(text, tokens, *limit),
            GazetteerQuery::WithinRadius { .. } => self.within_radius(query),
            GazetteerQuery::LocalityContaining { point } => self
                .localities
                .lookup(point.longitude, point.latitude)
                .map(|row| GazetteerRow::Locality((*row).clone()))
                .into_iter()
                .collect(),
            GazetteerQuery::StatisticalAreaContaining { point } => self
                .statistical_areas
                .lookup(point.longitude, point.latitude)
                .map(|row| GazetteerRow::StatisticalArea((*row).clone()))
                .into_iter()
                .collect(),
        };

        self.record(query.kind(), started.elapsed());
        debug!("{} returned {} rows", query.kind().label(), rows.len());
        Ok(rows)
    }

    fn metrics(&self) -> StoreMetrics {
        let in_flight = self.in_flight.load(Ordering::SeqCst);
        let busy = in_flight.min(self.max_connections);
        let total_queries = self.total_queries.load(Ordering::SeqCst);
        let average_query_ms = if total_queries == 0 {
            0.0
        } else {
            self.total_query_micros.load(Ordering::SeqCst) as f64 / total_queries as f64 / 1000.0
        };

        StoreMetrics {
            total_connections: self.max_connections,
            idle_connections: self.max_connections - busy,
            waiting_requests: in_flight.saturating_sub(self.max_connections),
            max_connections: self.max_connections,
            total_queries,
            average_query_ms,
            slow_queries: self.slow_queries.load(Ordering::SeqCst),
        }
    }
}
