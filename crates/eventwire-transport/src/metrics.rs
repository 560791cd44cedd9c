//! Lock-free transport metrics, exposed as a cloneable snapshot. Counters
//! are atomic; no mutex is held while updating them, so the hot path
//! stays lock-free.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Default, Clone, Serialize)]
pub struct TransportMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    /// EMA in milliseconds.
    pub average_request_duration_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub errors_by_type: HashMap<String, u64>,
}

#[derive(Default)]
pub struct MetricsCollector {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_bytes_sent: AtomicU64,
    total_bytes_received: AtomicU64,
    average_request_duration_bits: AtomicU64,
    errors_by_type: Mutex<HashMap<String, u64>>,
    /// Recent durations used to seed percentile estimates until enough
    /// samples accumulate; bounded so it never grows unbounded.
    recent_durations_ms: Mutex<Vec<f64>>,
}

const RECENT_WINDOW: usize = 256;

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request_start(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, duration_ms: f64, bytes_sent: u64, bytes_received: u64) {
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
        self.total_bytes_sent.fetch_add(bytes_sent, Ordering::Relaxed);
        self.total_bytes_received.fetch_add(bytes_received, Ordering::Relaxed);
        self.record_duration(duration_ms);
    }

    pub fn record_failure(&self, duration_ms: f64, error_type: &str) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.record_duration(duration_ms);
        let mut errors = self.errors_by_type.lock().unwrap();
        *errors.entry(error_type.to_string()).or_insert(0) += 1;
    }

    fn record_duration(&self, duration_ms: f64) {
        // Simple EMA: (old + new) / 2.
        let current = f64::from_bits(self.average_request_duration_bits.load(Ordering::Relaxed));
        let next = if current == 0.0 { duration_ms } else { (current + duration_ms) / 2.0 };
        self.average_request_duration_bits.store(next.to_bits(), Ordering::Relaxed);

        let mut samples = self.recent_durations_ms.lock().unwrap();
        samples.push(duration_ms);
        if samples.len() > RECENT_WINDOW {
            samples.remove(0);
        }
    }

    pub fn snapshot(&self) -> TransportMetrics {
        let average = f64::from_bits(self.average_request_duration_bits.load(Ordering::Relaxed));
        let samples = self.recent_durations_ms.lock().unwrap();
        let (p50, p95, p99) = percentiles(&samples, average);

        TransportMetrics {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            total_bytes_sent: self.total_bytes_sent.load(Ordering::Relaxed),
            total_bytes_received: self.total_bytes_received.load(Ordering::Relaxed),
            average_request_duration_ms: average,
            p50_ms: p50,
            p95_ms: p95,
            p99_ms: p99,
            errors_by_type: self.errors_by_type.lock().unwrap().clone(),
        }
    }
}

/// Derives p50/p95/p99 from the recent-sample window; seeded from the EMA
/// until samples accumulate.
fn percentiles(samples: &[f64], fallback: f64) -> (f64, f64, f64) {
    if samples.is_empty() {
        return (fallback, fallback, fallback);
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    (pick(&sorted, 0.50), pick(&sorted, 0.95), pick(&sorted, 0.99))
}

fn pick(sorted: &[f64], quantile: f64) -> f64 {
    let idx = ((sorted.len() as f64 - 1.0) * quantile).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_averages_toward_new_samples() {
        let metrics = MetricsCollector::new();
        metrics.record_success(100.0, 10, 20);
        metrics.record_success(200.0, 10, 20);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.average_request_duration_ms, 150.0);
    }

    #[test]
    fn failure_increments_error_type_count() {
        let metrics = MetricsCollector::new();
        metrics.record_failure(10.0, "NETWORK_ERROR");
        metrics.record_failure(10.0, "NETWORK_ERROR");
        metrics.record_failure(10.0, "TIMEOUT");
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.errors_by_type["NETWORK_ERROR"], 2);
        assert_eq!(snapshot.errors_by_type["TIMEOUT"], 1);
    }

    #[test]
    fn snapshot_is_independent_clone() {
        let metrics = MetricsCollector::new();
        metrics.record_success(50.0, 1, 1);
        let first = metrics.snapshot();
        metrics.record_success(50.0, 1, 1);
        assert_eq!(first.successful_requests, 1);
    }
}
