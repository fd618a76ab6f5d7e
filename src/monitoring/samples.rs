//! Rolling sample buffer and the statistics derived from it.

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Number of operations reported in the per-operation breakdown.
pub const TOP_OPERATIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    Success,
    Error(ErrorKind),
}

impl OutcomeClass {
    pub fn is_error(&self) -> bool {
        matches!(self, OutcomeClass::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub latency_ms: f64,
    pub outcome: OutcomeClass,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationBreakdown {
    pub operation: String,
    pub count: usize,
    pub average_latency_ms: f64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStatistics {
    pub window_secs: i64,
    pub sample_count: usize,
    pub average_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub error_rate: f64,
    pub throughput_per_second: f64,
    pub cache_hit_ratio: f64,
    pub top_operations: Vec<OperationBreakdown>,
}

/// Nearest-rank percentile of an ascending slice, 0.0 when empty.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Fixed-capacity buffer, oldest sample evicted first.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: VecDeque<PerformanceSample>,
    capacity: usize,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, sample: PerformanceSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Statistics over samples newer than `now - window`. Samples may have
    /// been appended out of timestamp order, so the whole buffer is scanned.
    pub fn statistics(&self, now: DateTime<Utc>, window: TimeDelta) -> PerformanceStatistics {
        let since = now - window;
        let recent: Vec<&PerformanceSample> = self
            .samples
            .iter()
            .filter(|s| s.timestamp > since && s.timestamp <= now)
            .collect();

        let count = recent.len();
        let mut latencies: Vec<f64> = recent.iter().map(|s| s.latency_ms).collect();
        latencies.sort_by(f64::total_cmp);

        let errors = recent.iter().filter(|s| s.outcome.is_error()).count();
        let cache_hits = recent.iter().filter(|s| s.cache_hit).count();
        let window_secs = window.num_seconds().max(1);

        PerformanceStatistics {
            window_secs,
            sample_count: count,
            average_latency_ms: if count == 0 {
                0.0
            } else {
                latencies.iter().sum::<f64>() / count as f64
            },
            p95_latency_ms: percentile(&latencies, 95.0),
            p99_latency_ms: percentile(&latencies, 99.0),
            error_rate: ratio(errors, count),
            throughput_per_second: count as f64 / window_secs as f64,
            cache_hit_ratio: ratio(cache_hits, count),
            top_operations: breakdown(&recent),
        }
    }
}

fn breakdown(samples: &[&PerformanceSample]) -> Vec<OperationBreakdown> {
    // (count, total latency, errors)
    let mut by_operation: HashMap<&str, (usize, f64, usize)> = HashMap::new();
    for sample in samples {
        let entry = by_operation
            .entry(sample.operation.as_str())
            .or_insert((0, 0.0, 0));
        entry.0 += 1;
        entry.1 += sample.latency_ms;
        if sample.outcome.is_error() {
            entry.2 += 1;
        }
    }

    let mut operations: Vec<OperationBreakdown> = by_operation
        .into_iter()
        .map(|(operation, (count, total, errors))| OperationBreakdown {
            operation: operation.to_string(),
            count,
            average_latency_ms: total / count as f64,
            error_rate: ratio(errors, count),
        })
        .collect();

    operations.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.operation.cmp(&b.operation)));
    operations.truncate(TOP_OPERATIONS);
    operations
}
