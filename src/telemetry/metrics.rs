//! Metrics
//!
//! Refresh counters for the credential manager.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free refresh counters.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    concurrent: AtomicU64,
    total_duration_ms: AtomicU64,
    last_duration_ms: AtomicU64,
}

impl RefreshMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A caller started a refresh.
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// A caller joined a refresh already in flight.
    pub fn record_concurrent(&self) {
        self.concurrent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, duration: Duration) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.record_duration(duration);
    }

    pub fn record_failure(&self, duration: Duration) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.record_duration(duration);
    }

    fn record_duration(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
        self.last_duration_ms.store(ms, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        for counter in [
            &self.attempts,
            &self.successes,
            &self.failures,
            &self.concurrent,
            &self.total_duration_ms,
            &self.last_duration_ms,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Counters plus the current gauges supplied by the owner.
    pub fn snapshot(
        &self,
        active_refreshes: usize,
        cooled_down_failures: usize,
    ) -> RefreshMetricsSnapshot {
        let successes = self.successes.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let completed = successes + failures;
        let total_ms = self.total_duration_ms.load(Ordering::Relaxed);

        RefreshMetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes,
            failures,
            concurrent: self.concurrent.load(Ordering::Relaxed),
            active_refreshes,
            cooled_down_failures,
            average_duration_ms: if completed == 0 { 0 } else { total_ms / completed },
            last_duration_ms: self.last_duration_ms.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RefreshMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshMetricsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    /// Calls that joined an in-flight refresh instead of starting one.
    pub concurrent: u64,
    pub active_refreshes: usize,
    pub cooled_down_failures: usize,
    pub average_duration_ms: u64,
    pub last_duration_ms: u64,
}
