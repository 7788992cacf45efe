//! Atomic counters for token fetch and refresh activity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Running total of provider call durations.
#[derive(Debug, Default)]
pub struct FetchLatency {
    calls: AtomicU64,
    total_micros: AtomicU64,
}

impl FetchLatency {
    pub fn record(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Mean call duration, zero before the first call.
    pub fn mean(&self) -> Duration {
        match self.calls.load(Ordering::Relaxed) {
            0 => Duration::ZERO,
            calls => Duration::from_micros(self.total_micros.load(Ordering::Relaxed) / calls),
        }
    }
}

/// Counters owned by one [`TokenCoordinator`](crate::TokenCoordinator).
#[derive(Debug, Default)]
pub struct AuthMetrics {
    pub fetch_attempts: Counter,
    pub fetch_failures: Counter,
    pub refreshes: Counter,
    pub fast_path_hits: Counter,
    pub guard_acquisitions: Counter,
    pub fetch_latency: FetchLatency,
}

impl AuthMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self, success: bool, elapsed: Duration) {
        self.fetch_attempts.inc();
        self.fetch_latency.record(elapsed);
        if !success {
            self.fetch_failures.inc();
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            fetch_attempts: self.fetch_attempts.get(),
            fetch_failures: self.fetch_failures.get(),
            refreshes: self.refreshes.get(),
            fast_path_hits: self.fast_path_hits.get(),
            guard_acquisitions: self.guard_acquisitions.get(),
            mean_fetch_latency: self.fetch_latency.mean(),
        }
    }
}

/// Point-in-time snapshot of [`AuthMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub fetch_attempts: u64,
    pub fetch_failures: u64,
    pub refreshes: u64,
    pub fast_path_hits: u64,
    pub guard_acquisitions: u64,
    pub mean_fetch_latency: Duration,
}
