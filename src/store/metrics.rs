// METRICS: Per-operation latency and throughput counters kept by the document store

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OperationMetricsSnapshot {
    pub total: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
    pub last_latency_ms: u64,
    pub ops_per_second: f64,
}

#[derive(Debug, Default)]
struct OperationCounter {
    total: u64,
    errors: u64,
    total_latency_ms: u64,
    max_latency_ms: u64,
    last_latency_ms: u64,
}

#[derive(Debug)]
pub struct OperationMetrics {
    started_at: Instant,
    counters: Mutex<BTreeMap<&'static str, OperationCounter>>,
}

impl Default for OperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            counters: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn record(&self, operation: &'static str, latency_ms: u64, success: bool) {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let counter = counters.entry(operation).or_default();
        counter.total += 1;
        if !success {
            counter.errors += 1;
        }
        counter.total_latency_ms += latency_ms;
        counter.max_latency_ms = counter.max_latency_ms.max(latency_ms);
        counter.last_latency_ms = latency_ms;
    }

    pub fn snapshot(&self) -> BTreeMap<String, OperationMetricsSnapshot> {
        let uptime_secs = self.started_at.elapsed().as_secs_f64().max(1e-3);
        let counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        counters
            .iter()
            .map(|(name, c)| {
                let avg = if c.total == 0 {
                    0.0
                } else {
                    c.total_latency_ms as f64 / c.total as f64
                };
                (
                    name.to_string(),
                    OperationMetricsSnapshot {
                        total: c.total,
                        errors: c.errors,
                        avg_latency_ms: avg,
                        max_latency_ms: c.max_latency_ms,
                        last_latency_ms: c.last_latency_ms,
                        ops_per_second: c.total as f64 / uptime_secs,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_latency_and_errors() {
        let metrics = OperationMetrics::new();
        metrics.record("search", 10, true);
        metrics.record("search", 30, false);
        metrics.record("upsert", 5, true);

        let snapshot = metrics.snapshot();
        let search = &snapshot["search"];
        assert_eq!(search.total, 2);
        assert_eq!(search.errors, 1);
        assert_eq!(search.max_latency_ms, 30);
        assert_eq!(search.last_latency_ms, 30);
        assert!((search.avg_latency_ms - 20.0).abs() < f64::EPSILON);
        assert_eq!(snapshot["upsert"].total, 1);
    }
}
