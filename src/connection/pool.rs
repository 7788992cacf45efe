use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{
    PgConnectOptions, PgPool, PgPoolOptions, PgQueryResult, PgRow, PgStatement, PgTypeInfo,
    Postgres,
};
use sqlx::{Connection, Describe, Either, Execute, Executor};
use tokio::task::JoinHandle;

use super::BeforeConnect;
use super::hook::with_token;
use crate::Result;
use crate::auth::TokenCoordinator;

/// How often a token without a known deadline is re-checked.
const UNBOUNDED_CHECK_INTERVAL: Duration = Duration::from_secs(30);
/// Shortest wait between background refresh checks.
const MIN_REFRESH_DELAY: Duration = Duration::from_secs(1);

/// A `PgPool` whose connect options always carry the coordinator's current token.
///
/// A background task follows the coordinator: every refreshed token, whoever
/// triggered it, is written into the pool's connect options, and a token nearing
/// its deadline is refreshed before it lapses. Connections the pool opens on its
/// own (`min_connections`, replacing closed ones) therefore authenticate with a
/// valid token too. Pooled connections are pinged before being handed out.
///
/// `&AuthenticatedPool` is a [`sqlx::Executor`], so queries can run against it
/// directly.
#[derive(Debug, Clone)]
pub struct AuthenticatedPool {
    pool: PgPool,
    base: PgConnectOptions,
    hook: BeforeConnect,
    _refresh: Option<Arc<RefreshTask>>,
}

#[derive(Debug)]
struct RefreshTask(JoinHandle<()>);

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl AuthenticatedPool {
    /// Build a lazily connecting pool. No connection is opened until first use.
    pub async fn new(
        pool_options: PgPoolOptions,
        base: PgConnectOptions,
        hook: BeforeConnect,
    ) -> Result<Self> {
        let initial = hook.apply(base.clone()).await?;
        let pool = pool_options
            .before_acquire(|conn, _meta| {
                Box::pin(async move {
                    conn.ping().await?;
                    Ok(true)
                })
            })
            .connect_lazy_with(initial);

        let refresh = hook.coordinator().map(|coordinator| {
            Arc::new(RefreshTask(spawn_refresh(
                pool.clone(),
                base.clone(),
                coordinator.clone(),
            )))
        });

        Ok(Self {
            pool,
            base,
            hook,
            _refresh: refresh,
        })
    }

    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>> {
        self.refresh_connect_options().await?;
        Ok(self.pool.acquire().await?)
    }

    /// Make sure the pool's connect options hold a valid token now.
    pub async fn refresh_connect_options(&self) -> Result<()> {
        if self.hook.is_noop() {
            return Ok(());
        }
        let options = self.hook.apply(self.base.clone()).await?;
        self.pool.set_connect_options(options);
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn hook(&self) -> &BeforeConnect {
        &self.hook
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn spawn_refresh(
    pool: PgPool,
    base: PgConnectOptions,
    coordinator: Arc<TokenCoordinator>,
) -> JoinHandle<()> {
    let mut updates = coordinator.subscribe();

    tokio::spawn(async move {
        loop {
            let wait = next_check(&coordinator, SystemTime::now());

            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let token = updates.borrow_and_update().clone();
                    if let Some(token) = token {
                        pool.set_connect_options(with_token(base.clone(), &token));
                        tracing::debug!(
                            provider = coordinator.provider_name(),
                            "pool connect options updated with refreshed token"
                        );
                    }
                }
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = coordinator.current_token().await {
                        tracing::warn!(
                            provider = coordinator.provider_name(),
                            error = %e,
                            "background db auth token refresh failed"
                        );
                    }
                }
                _ = pool.close_event() => break,
            }
        }
    })
}

/// Time until the held token reaches its deadline, or the fixed interval when the
/// deadline is unknown.
fn next_check(coordinator: &TokenCoordinator, now: SystemTime) -> Duration {
    let deadline = coordinator.peek().and_then(|token| token.expires_at());
    match deadline {
        Some(deadline) => deadline
            .duration_since(now)
            .unwrap_or_default()
            .max(MIN_REFRESH_DELAY),
        None => UNBOUNDED_CHECK_INTERVAL,
    }
}

impl<'p> Executor<'p> for &'_ AuthenticatedPool {
    type Database = Postgres;

    fn fetch_many<'e, 'q: 'e, E>(
        self,
        query: E,
    ) -> BoxStream<'e, std::result::Result<Either<PgQueryResult, PgRow>, sqlx::Error>>
    where
        E: 'q + Execute<'q, Postgres>,
    {
        (&self.pool).fetch_many(query)
    }

    fn fetch_optional<'e, 'q: 'e, E>(
        self,
        query: E,
    ) -> BoxFuture<'e, std::result::Result<Option<PgRow>, sqlx::Error>>
    where
        E: 'q + Execute<'q, Postgres>,
    {
        (&self.pool).fetch_optional(query)
    }

    fn prepare_with<'e, 'q: 'e>(
        self,
        sql: &'q str,
        parameters: &'e [PgTypeInfo],
    ) -> BoxFuture<'e, std::result::Result<PgStatement<'q>, sqlx::Error>> {
        (&self.pool).prepare_with(sql, parameters)
    }

    #[doc(hidden)]
    fn describe<'e, 'q: 'e>(
        self,
        sql: &'q str,
    ) -> BoxFuture<'e, std::result::Result<Describe<Postgres>, sqlx::Error>> {
        (&self.pool).describe(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthToken, Validity};
    use crate::{RetryConfig, RetryingFetcher, StaticTokenProvider};

    #[test]
    fn test_next_check_without_token_uses_interval() {
        let coordinator = TokenCoordinator::uninitialized(
            Arc::new(StaticTokenProvider::new("unused")),
            RetryingFetcher::new(RetryConfig::no_retry()),
        );
        assert_eq!(
            next_check(&coordinator, SystemTime::now()),
            UNBOUNDED_CHECK_INTERVAL
        );
    }

    #[tokio::test]
    async fn test_next_check_follows_deadline() {
        let deadline = SystemTime::now() + Duration::from_secs(600);
        let coordinator = TokenCoordinator::init(
            Arc::new(DeadlineProvider(deadline)),
            RetryingFetcher::new(RetryConfig::no_retry()),
        )
        .await
        .unwrap();

        let now = deadline - Duration::from_secs(120);
        assert_eq!(next_check(&coordinator, now), Duration::from_secs(120));

        // Past the deadline: retry soon, but never in a tight loop.
        let late = deadline + Duration::from_secs(5);
        assert_eq!(next_check(&coordinator, late), MIN_REFRESH_DELAY);
    }

    struct DeadlineProvider(SystemTime);

    #[async_trait::async_trait]
    impl crate::TokenProvider for DeadlineProvider {
        fn name(&self) -> &'static str {
            "deadline"
        }

        async fn generate_token(&self) -> Result<AuthToken> {
            Ok(AuthToken::new("pw", Validity::Until(self.0)))
        }
    }

    fn assert_executor<'a, E: Executor<'a, Database = Postgres>>(_: E) {}

    #[tokio::test]
    async fn test_pool_reference_is_executor() {
        let pool = AuthenticatedPool::new(
            PgPoolOptions::new(),
            PgConnectOptions::new().host("127.0.0.1").port(1),
            BeforeConnect::noop(),
        )
        .await
        .unwrap();
        assert_executor(&pool);
        assert!(pool._refresh.is_none());
    }
}
