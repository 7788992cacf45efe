//! Observability for token fetching.
//!
//! - **Retry sink**: every failed fetch attempt is reported, even when a later
//!   attempt succeeds and the caller never sees the error.
//! - **Metrics**: atomic counters per coordinator, see [`AuthMetrics`].

mod metrics;

pub use metrics::{AuthMetrics, Counter, FetchLatency, MetricsSummary};

use crate::Error;

/// Receives one call per failed token fetch attempt.
pub trait RetrySink: Send + Sync {
    fn record_retry(&self, attempt: u32, provider: &str, error: &Error);
}

/// Default sink: logs each failed attempt through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl RetrySink for TracingSink {
    fn record_retry(&self, attempt: u32, provider: &str, error: &Error) {
        tracing::error!(attempt, provider, error = %error, "failed to fetch auth token");
    }
}
