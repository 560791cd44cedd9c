//! Atomic call metrics: `totalCalls, successfulCalls, failedCalls,
//! retriedCalls`, plus derived rates.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default, Clone, Serialize)]
pub struct ToolCallMetrics {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub retried_calls: u64,
    pub success_rate: f64,
    pub retry_rate: f64,
}

#[derive(Default)]
pub struct ToolCallMetricsCollector {
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    retried_calls: AtomicU64,
}

impl ToolCallMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call(&self, succeeded: bool, attempt_count: u32) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            self.successful_calls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }
        if attempt_count > 1 {
            self.retried_calls.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ToolCallMetrics {
        let total = self.total_calls.load(Ordering::Relaxed);
        let successful = self.successful_calls.load(Ordering::Relaxed);
        let failed = self.failed_calls.load(Ordering::Relaxed);
        let retried = self.retried_calls.load(Ordering::Relaxed);
        ToolCallMetrics {
            total_calls: total,
            successful_calls: successful,
            failed_calls: failed,
            retried_calls: retried,
            success_rate: if total > 0 { successful as f64 / total as f64 } else { 0.0 },
            retry_rate: if total > 0 { retried as f64 / total as f64 } else { 0.0 },
        }
    }

    pub fn reset(&self) {
        self.total_calls.store(0, Ordering::Relaxed);
        self.successful_calls.store(0, Ordering::Relaxed);
        self.failed_calls.store(0, Ordering::Relaxed);
        self.retried_calls.store(0, Ordering::Relaxed);
    }
}
