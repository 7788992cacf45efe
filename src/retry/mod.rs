//! Bounded retry with exponential backoff around a single token provider call.
//!
//! A flaky IAM endpoint (rate limiting, momentary network errors) should not fail
//! a connection attempt, but a dead one must not stall it for long either. The
//! default policy makes 3 attempts with 50ms and 100ms pauses in between.

mod backoff;

pub use backoff::ExponentialBackoff;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::{AuthToken, TokenProvider};
use crate::observability::{AuthMetrics, RetrySink, TracingSink};
use crate::{Error, Result};

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub backoff: ExponentialBackoff,
    /// Upper bound for a single provider call; `None` waits indefinitely.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: ExponentialBackoff::default(),
            attempt_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }
}

/// Calls a [`TokenProvider`] until it succeeds or the attempt budget is spent.
#[derive(Clone)]
pub struct RetryingFetcher {
    config: RetryConfig,
    sink: Arc<dyn RetrySink>,
    metrics: Option<Arc<AuthMetrics>>,
}

impl std::fmt::Debug for RetryingFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingFetcher")
            .field("config", &self.config)
            .field("has_metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl RetryingFetcher {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            sink: Arc::new(TracingSink),
            metrics: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn RetrySink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AuthMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Fetch a token, retrying transient failures.
    ///
    /// Every failed attempt is reported to the sink. The returned
    /// [`Error::Fetch`] carries the last provider error.
    pub async fn fetch(&self, provider: &dyn TokenProvider) -> Result<AuthToken> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let started = Instant::now();
            let result = self.attempt(provider).await;
            self.record(result.is_ok(), started);

            let error = match result {
                Ok(token) => return Ok(token),
                Err(e) => e,
            };

            self.sink.record_retry(attempt, provider.name(), &error);

            if attempt >= max_attempts || !error.is_retryable() {
                return Err(Error::Fetch {
                    attempts: attempt,
                    source: Box::new(error),
                });
            }

            tokio::time::sleep(self.config.backoff.delay_after(attempt)).await;
        }
    }

    async fn attempt(&self, provider: &dyn TokenProvider) -> Result<AuthToken> {
        match self.config.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, provider.generate_token())
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => provider.generate_token().await,
        }
    }

    fn record(&self, success: bool, started: Instant) {
        if let Some(ref metrics) = self.metrics {
            metrics.record_attempt(success, started.elapsed());
        }
    }
}

impl Default for RetryingFetcher {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyProvider {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenProvider for FlakyProvider {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn generate_token(&self) -> Result<AuthToken> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(Error::provider("flaky", format!("failure {}", call)))
            } else {
                Ok(AuthToken::non_expiring(format!("token-{}", call)))
            }
        }
    }

    struct MisconfiguredProvider;

    #[async_trait]
    impl TokenProvider for MisconfiguredProvider {
        fn name(&self) -> &'static str {
            "misconfigured"
        }

        async fn generate_token(&self) -> Result<AuthToken> {
            Err(Error::config("missing host"))
        }
    }

    struct HangingProvider;

    #[async_trait]
    impl TokenProvider for HangingProvider {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn generate_token(&self) -> Result<AuthToken> {
            futures::future::pending().await
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        attempts: Mutex<Vec<u32>>,
    }

    impl RetrySink for RecordingSink {
        fn record_retry(&self, attempt: u32, _provider: &str, _error: &Error) {
            self.attempts.lock().unwrap().push(attempt);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_failures() {
        let provider = FlakyProvider::new(2);
        let sink = Arc::new(RecordingSink::default());
        let fetcher = RetryingFetcher::default().with_sink(sink.clone());

        let started = tokio::time::Instant::now();
        let token = fetcher.fetch(&provider).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(token.expose(), "token-3");
        assert_eq!(provider.call_count(), 3);
        assert_eq!(*sink.attempts.lock().unwrap(), vec![1, 2]);
        // 50ms after the first failure, 100ms after the second
        assert!(elapsed >= Duration::from_millis(150));
        assert!(elapsed < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_three_attempts() {
        let provider = FlakyProvider::new(u32::MAX);
        let sink = Arc::new(RecordingSink::default());
        let fetcher = RetryingFetcher::default().with_sink(sink.clone());

        let err = fetcher.fetch(&provider).await.unwrap_err();

        assert_eq!(provider.call_count(), 3);
        assert_eq!(err.attempts(), Some(3));
        assert!(err.to_string().contains("failure 3"));
        assert_eq!(*sink.attempts.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configuration_error_not_retried() {
        let fetcher = RetryingFetcher::default();

        let err = fetcher.fetch(&MisconfiguredProvider).await.unwrap_err();

        assert_eq!(err.attempts(), Some(1));
        match err {
            Error::Fetch { source, .. } => assert!(source.is_configuration_error()),
            other => panic!("Expected fetch error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retried() {
        let config = RetryConfig::default().with_attempt_timeout(Some(Duration::from_secs(1)));
        let fetcher = RetryingFetcher::new(config);

        let err = fetcher.fetch(&HangingProvider).await.unwrap_err();

        assert_eq!(err.attempts(), Some(3));
        match err {
            Error::Fetch { source, .. } => assert!(matches!(*source, Error::Timeout(_))),
            other => panic!("Expected fetch error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let metrics = Arc::new(AuthMetrics::new());
        let fetcher = RetryingFetcher::new(RetryConfig::default().with_backoff(
            ExponentialBackoff::new(Duration::from_millis(1), 1, Duration::from_millis(1)),
        ))
        .with_metrics(metrics.clone());

        fetcher.fetch(&FlakyProvider::new(1)).await.unwrap();

        assert_eq!(metrics.fetch_attempts.get(), 2);
        assert_eq!(metrics.fetch_failures.get(), 1);
    }

    #[test]
    fn test_no_retry_config() {
        assert_eq!(RetryConfig::no_retry().max_attempts, 1);
        assert_eq!(RetryConfig::default().with_max_attempts(0).max_attempts, 1);
    }
}
