//! Metrics.
//!
//! Monotone atomic counters plus a small hand-rolled histogram — no metrics
//! crate is pulled in since the only consumer is the `/metrics` JSON
//! snapshot, not a Prometheus scrape endpoint. Histogram bucket updates
//! only need a short-held lock, which a `Mutex<Vec<u64>>` of bucket
//! counts satisfies just as well without a dependency.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

/// Upper bounds (milliseconds) of the latency histogram's buckets; the final
/// bucket is implicitly "+Inf".
const LATENCY_BUCKETS_MS: &[u64] = &[10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000];
/// Upper bounds (bytes) of the body-size histogram's buckets.
const BODY_SIZE_BUCKETS: &[u64] = &[1_024, 16_384, 65_536, 262_144, 1_048_576, 10_485_760, 104_857_600];

struct Histogram {
    bucket_bounds: &'static [u64],
    counts: Mutex<Vec<u64>>,
    sum: AtomicU64,
    observations: AtomicU64,
}

impl Histogram {
    fn new(bucket_bounds: &'static [u64]) -> Self {
        Self {
            bucket_bounds,
            counts: Mutex::new(vec![0; bucket_bounds.len() + 1]),
            sum: AtomicU64::new(0),
            observations: AtomicU64::new(0),
        }
    }

    fn observe(&self, value: u64) {
        let idx = self.bucket_bounds.iter().position(|&bound| value <= bound).unwrap_or(self.bucket_bounds.len());
        self.counts.lock().unwrap()[idx] += 1;
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.observations.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HistogramSnapshot {
        let counts = self.counts.lock().unwrap().clone();
        HistogramSnapshot {
            bucket_bounds: self.bucket_bounds.to_vec(),
            counts,
            sum: self.sum.load(Ordering::Relaxed),
            observations: self.observations.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        let mut counts = self.counts.lock().unwrap();
        counts.iter_mut().for_each(|c| *c = 0);
        self.sum.store(0, Ordering::Relaxed);
        self.observations.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramSnapshot {
    pub bucket_bounds: Vec<u64>,
    pub counts: Vec<u64>,
    pub sum: u64,
    pub observations: u64,
}

/// Process-wide metrics registry, held in `AppState` behind an `Arc`.
pub struct MetricsRegistry {
    requests_total: AtomicU64,
    responses_total: AtomicU64,
    cache_hits_total: AtomicU64,
    cache_misses_total: AtomicU64,
    client_aborts_total: AtomicU64,
    in_flight: AtomicI64,
    latency_ms: Histogram,
    body_bytes: Histogram,
    started_at: Instant,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            responses_total: AtomicU64::new(0),
            cache_hits_total: AtomicU64::new(0),
            cache_misses_total: AtomicU64::new(0),
            client_aborts_total: AtomicU64::new(0),
            in_flight: AtomicI64::new(0),
            latency_ms: Histogram::new(LATENCY_BUCKETS_MS),
            body_bytes: Histogram::new(BODY_SIZE_BUCKETS),
            started_at: Instant::now(),
        }
    }

    pub fn record_request_start(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a terminal transition for one exchange.
    pub fn record_request_end(&self, elapsed_ms: u64, body_bytes: u64) {
        self.responses_total.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.latency_ms.observe(elapsed_ms);
        self.body_bytes.observe(body_bytes);
    }

    pub fn record_client_abort(&self) {
        self.client_aborts_total.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.requests_total.store(0, Ordering::Relaxed);
        self.responses_total.store(0, Ordering::Relaxed);
        self.cache_hits_total.store(0, Ordering::Relaxed);
        self.cache_misses_total.store(0, Ordering::Relaxed);
        self.client_aborts_total.store(0, Ordering::Relaxed);
        self.latency_ms.reset();
        self.body_bytes.reset();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            responses_total: self.responses_total.load(Ordering::Relaxed),
            cache_hits_total: self.cache_hits_total.load(Ordering::Relaxed),
            cache_misses_total: self.cache_misses_total.load(Ordering::Relaxed),
            client_aborts_total: self.client_aborts_total.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed).max(0) as u64,
            latency_ms: self.latency_ms.snapshot(),
            body_bytes: self.body_bytes.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub requests_total: u64,
    pub responses_total: u64,
    pub cache_hits_total: u64,
    pub cache_misses_total: u64,
    pub client_aborts_total: u64,
    pub in_flight: u64,
    pub latency_ms: HistogramSnapshot,
    pub body_bytes: HistogramSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_lifecycle_updates_counters_and_in_flight_gauge() {
        let metrics = MetricsRegistry::new();
        metrics.record_request_start();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 1);
        assert_eq!(snapshot.in_flight, 1);

        metrics.record_request_end(42, 1024);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.responses_total, 1);
        assert_eq!(snapshot.in_flight, 0);
        assert_eq!(snapshot.latency_ms.observations, 1);
    }

    #[test]
    fn reset_zeroes_every_counter() {
        let metrics = MetricsRegistry::new();
        metrics.record_request_start();
        metrics.record_cache_hit();
        metrics.reset();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 0);
        assert_eq!(snapshot.cache_hits_total, 0);
    }

    #[test]
    fn histogram_buckets_observation_into_the_right_bucket() {
        let histogram = Histogram::new(&[10, 100]);
        histogram.observe(5);
        histogram.observe(50);
        histogram.observe(500);
        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.counts, vec![1, 1, 1]);
    }
}
