//! Single-token cache with coordinated refresh.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::{Mutex, watch};

use super::{AuthToken, TokenProvider};
use crate::Result;
use crate::observability::{AuthMetrics, MetricsSummary};
use crate::retry::RetryingFetcher;

/// Owns the current token for one database identity.
///
/// `current_token` uses double-checked locking:
///
/// 1. Return the held token if it is still valid, without touching the refresh guard.
/// 2. Otherwise take the guard and check again, since another caller may have
///    refreshed while this one waited.
/// 3. Only if the token is still stale, fetch a new one and swap it in.
///
/// Concurrent callers that observe the same expiry therefore trigger exactly one
/// fetch. A failed fetch leaves the previous token in place and releases the guard.
///
/// Every stored token is also published to [`subscribe`](Self::subscribe) receivers, so
/// holders of derived state (pool connect options) follow refreshes made by any caller.
pub struct TokenCoordinator {
    provider: Arc<dyn TokenProvider>,
    fetcher: RetryingFetcher,
    current: ArcSwapOption<AuthToken>,
    refresh_guard: Mutex<()>,
    updates: watch::Sender<Option<Arc<AuthToken>>>,
    metrics: Arc<AuthMetrics>,
}

impl std::fmt::Debug for TokenCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCoordinator")
            .field("provider", &self.provider.name())
            .field("fetcher", &self.fetcher)
            .field("has_token", &self.current.load().is_some())
            .finish_non_exhaustive()
    }
}

impl TokenCoordinator {
    /// Create the coordinator and fetch the first token.
    ///
    /// A failure here is returned to the caller instead of surfacing on the
    /// first connection attempt.
    pub async fn init(provider: Arc<dyn TokenProvider>, fetcher: RetryingFetcher) -> Result<Self> {
        let coordinator = Self::uninitialized(provider, fetcher);

        tracing::info!(provider = coordinator.provider.name(), "getting initial db auth token");
        let token = coordinator.fetcher.fetch(coordinator.provider.as_ref()).await?;
        coordinator.publish(Arc::new(token));

        Ok(coordinator)
    }

    /// Create without fetching; the first `current_token` call fetches instead.
    pub fn uninitialized(provider: Arc<dyn TokenProvider>, fetcher: RetryingFetcher) -> Self {
        let metrics = Arc::new(AuthMetrics::new());
        Self {
            provider,
            fetcher: fetcher.with_metrics(metrics.clone()),
            current: ArcSwapOption::empty(),
            refresh_guard: Mutex::new(()),
            updates: watch::Sender::new(None),
            metrics,
        }
    }

    /// Return a token that is valid right now, refreshing if needed.
    pub async fn current_token(&self) -> Result<Arc<AuthToken>> {
        if let Some(token) = self.valid_token() {
            self.metrics.fast_path_hits.inc();
            return Ok(token);
        }

        tracing::debug!(provider = self.provider.name(), "db auth token missing or expired");

        let _guard = self.refresh_guard.lock().await;
        self.metrics.guard_acquisitions.inc();

        // Another caller may have refreshed while this one waited for the guard.
        if let Some(token) = self.valid_token() {
            return Ok(token);
        }

        tracing::info!(provider = self.provider.name(), "refreshing db auth token");
        let token = Arc::new(self.fetcher.fetch(self.provider.as_ref()).await?);
        self.publish(token.clone());

        Ok(token)
    }

    /// Held token regardless of validity.
    pub fn peek(&self) -> Option<Arc<AuthToken>> {
        self.current.load_full()
    }

    /// Receiver that observes every newly stored token.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<AuthToken>>> {
        self.updates.subscribe()
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn metrics(&self) -> MetricsSummary {
        self.metrics.summary()
    }

    fn publish(&self, token: Arc<AuthToken>) {
        self.current.store(Some(token.clone()));
        self.updates.send_replace(Some(token));
        self.metrics.refreshes.inc();
    }

    fn valid_token(&self) -> Option<Arc<AuthToken>> {
        self.current.load_full().filter(|token| token.is_valid())
    }
}
