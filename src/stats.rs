//! In-process request statistics.
//!
//! [`MetricsCollector`] aggregates what [`Gateway::metrics()`](crate::Gateway::metrics)
//! reports: request outcome counters, per-backend usage and a running mean
//! of backend latency. Every resolved request bumps `total` together with
//! exactly one of `successful`/`failed`, so `total == successful + failed`
//! whenever no request is mid-resolution. Cache hits count as successes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

/// Running arithmetic mean over real (non-cache) successful calls.
#[derive(Debug, Default)]
struct LatencyMean {
    mean_ms: f64,
    samples: u64,
}

impl LatencyMean {
    fn fold(&mut self, latency_ms: f64) {
        self.samples += 1;
        self.mean_ms += (latency_ms - self.mean_ms) / self.samples as f64;
    }
}

/// Thread-safe request statistics.
#[derive(Debug)]
pub struct MetricsCollector {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    cache_hits: AtomicU64,
    backend_usage: DashMap<String, u64>,
    latency: Mutex<LatencyMean>,
    started_at: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            backend_usage: DashMap::new(),
            latency: Mutex::new(LatencyMean::default()),
            started_at: Instant::now(),
        }
    }

    /// A request answered from the cache. Usage and latency are untouched.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.successful.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// A request served by `backend` (the one that actually answered).
    pub fn record_success(&self, backend: &str, latency: Duration) {
        *self.backend_usage.entry(backend.to_string()).or_insert(0) += 1;
        self.latency.lock().fold(latency.as_secs_f64() * 1_000.0);
        self.successful.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// A request that failed outright.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-at-rest view of all counters plus derived rates.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_requests = self.total.load(Ordering::Relaxed);
        let successful_requests = self.successful.load(Ordering::Relaxed);
        let failed_requests = self.failed.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);

        let provider_usage = self
            .backend_usage
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        MetricsSnapshot {
            total_requests,
            successful_requests,
            failed_requests,
            cache_hits,
            provider_usage,
            average_latency_ms: self.latency.lock().mean_ms,
            success_rate: ratio(successful_requests, total_requests),
            cache_hit_rate: ratio(cache_hits, total_requests),
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64).min(1.0)
    }
}

/// Snapshot returned by [`MetricsCollector::snapshot()`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cache_hits: u64,
    /// Successful real calls per serving backend.
    pub provider_usage: BTreeMap<String, u64>,
    pub average_latency_ms: f64,
    pub success_rate: f64,
    pub cache_hit_rate: f64,
    pub uptime_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rates_are_zero() {
        let snapshot = MetricsCollector::new().snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.cache_hit_rate, 0.0);
        assert_eq!(snapshot.average_latency_ms, 0.0);
    }

    #[test]
    fn running_mean_ignores_cache_hits() {
        let collector = MetricsCollector::new();
        collector.record_success("a", Duration::from_millis(100));
        collector.record_cache_hit();
        collector.record_success("a", Duration::from_millis(300));
        let snapshot = collector.snapshot();
        assert!((snapshot.average_latency_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn usage_counts_serving_backend() {
        let collector = MetricsCollector::new();
        collector.record_success("a", Duration::ZERO);
        collector.record_success("degraded", Duration::ZERO);
        collector.record_success("a", Duration::ZERO);
        let usage = collector.snapshot().provider_usage;
        assert_eq!(usage.get("a"), Some(&2));
        assert_eq!(usage.get("degraded"), Some(&1));
    }

    #[test]
    fn totals_balance() {
        let collector = MetricsCollector::new();
        collector.record_success("a", Duration::ZERO);
        collector.record_failure();
        collector.record_cache_hit();
        let s = collector.snapshot();
        assert_eq!(s.total_requests, 3);
        assert_eq!(s.total_requests, s.successful_requests + s.failed_requests);
        assert!((s.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((s.cache_hit_rate - 1.0 / 3.0).abs() < 1e-9);
    }
}
