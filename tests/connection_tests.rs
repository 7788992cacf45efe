//! Connection surfaces: hook, connector, pool and authenticated connection strings.
//!
//! None of these tests need a running database; pools connect lazily.
//!
//! Run: cargo nextest run --test connection_tests

use async_trait::async_trait;
use pg_iam_auth::{
    AuthMethod, AuthToken, AuthenticatedPool, Config, Error, RetryConfig, StaticTokenProvider,
    TokenProvider, Validity, VaultConfig, authenticated_conn_string, before_connect, connector,
    new_pool, new_pool_with,
};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pg_iam_auth=debug")
        .with_test_writer()
        .try_init();
}

async fn vault_server(username: &str, password: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/database/creds/app"))
        .and(header("X-Vault-Token", "hvs.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lease_duration": 3600,
            "data": { "username": username, "password": password }
        })))
        .mount(&server)
        .await;
    server
}

// =============================================================================
// Configuration rejection
// =============================================================================

mod config_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_conn_string_rejected_everywhere() {
        let config = Config::new("");

        assert!(before_connect(&config).await.unwrap_err().is_configuration_error());
        assert!(connector(&config).await.unwrap_err().is_configuration_error());
        assert!(new_pool(&config).await.unwrap_err().is_configuration_error());
        assert!(
            authenticated_conn_string(&config)
                .await
                .unwrap_err()
                .is_configuration_error()
        );
    }

    #[tokio::test]
    async fn test_missing_vault_config_fails_before_network() {
        let config =
            Config::new("postgres://app@db:5432/app").with_auth_method(AuthMethod::Vault);

        let err = before_connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("invalid Vault config"));
    }

    #[tokio::test]
    async fn test_malformed_url_is_connection_string_error() {
        let config = Config::new("postgres://user:oldp/mydb")
            .with_token_provider(Arc::new(StaticTokenProvider::new("pw")));

        let err = connector(&config).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionString(_)));

        let err = authenticated_conn_string(&config).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionString(_)));
    }
}

// =============================================================================
// Authenticated connection strings
// =============================================================================

mod conn_string_tests {
    use super::*;

    #[tokio::test]
    async fn test_standard_auth_returns_input() {
        let config = Config::new("postgres://app:static@db:5432/app");
        assert_eq!(
            authenticated_conn_string(&config).await.unwrap(),
            "postgres://app:static@db:5432/app"
        );
    }

    #[tokio::test]
    async fn test_token_substituted_into_url() {
        let config = Config::new("postgres://app:old@db:5432/app?sslmode=require")
            .with_token_provider(Arc::new(StaticTokenProvider::new("tok/with space")));

        assert_eq!(
            authenticated_conn_string(&config).await.unwrap(),
            "postgres://app:tok%2Fwith+space@db:5432/app?sslmode=require"
        );
    }

    #[tokio::test]
    async fn test_token_substituted_into_dsn() {
        let config = Config::new("host=db user=app dbname=app")
            .with_token_provider(Arc::new(StaticTokenProvider::new("o'token")));

        assert_eq!(
            authenticated_conn_string(&config).await.unwrap(),
            "host=db user=app dbname=app password='o''token'"
        );
    }

    #[tokio::test]
    async fn test_vault_credentials_substituted() {
        init_tracing();
        let server = vault_server("v-app-1", "generated").await;
        let config = Config::new("postgres://placeholder@db:5432/app")
            .with_vault(VaultConfig::new(server.uri(), "hvs.test", "database/creds/app"))
            .with_retry(RetryConfig::no_retry());

        assert_eq!(
            authenticated_conn_string(&config).await.unwrap(),
            "postgres://v-app-1:generated@db:5432/app"
        );
    }

    #[tokio::test]
    async fn test_vault_unreachable_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let config = Config::new("host=db user=app")
            .with_vault(VaultConfig::new(server.uri(), "hvs.test", "database/creds/app"))
            .with_retry(RetryConfig::default().with_max_attempts(2));

        let err = authenticated_conn_string(&config).await.unwrap_err();
        assert_eq!(err.attempts(), Some(2));
        assert!(err.to_string().contains("503"));
    }
}

// =============================================================================
// Hook, connector and pool
// =============================================================================

mod surface_tests {
    use super::*;

    #[tokio::test]
    async fn test_standard_auth_hook_is_noop() {
        let hook = before_connect(&Config::new("postgres://app:pw@db/app"))
            .await
            .unwrap();
        assert!(hook.is_noop());
        assert!(hook.coordinator().is_none());
    }

    #[tokio::test]
    async fn test_connector_applies_vault_username() {
        init_tracing();
        let server = vault_server("v-app-2", "generated").await;
        let config = Config::new("host=db.internal port=6432 user=placeholder dbname=app")
            .with_vault(VaultConfig::new(server.uri(), "hvs.test", "database/creds/app"));

        let connector = connector(&config).await.unwrap();
        let options = connector.connect_options().await.unwrap();

        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6432);
        assert_eq!(options.get_username(), "v-app-2");
    }

    #[tokio::test]
    async fn test_hook_reuses_token_between_connections() {
        let config = Config::new("postgres://app@db:5432/app")
            .with_token_provider(Arc::new(StaticTokenProvider::new("pw")));
        let connector = connector(&config).await.unwrap();

        connector.connect_options().await.unwrap();
        connector.connect_options().await.unwrap();

        let metrics = connector.hook().coordinator().unwrap().metrics();
        assert_eq!(metrics.refreshes, 1);
        assert_eq!(metrics.fast_path_hits, 2);
    }

    #[tokio::test]
    async fn test_pool_is_lazy_and_authenticated() {
        let config = Config::new("postgres://app@127.0.0.1:1/app")
            .with_token_provider(Arc::new(StaticTokenProvider::new("pw")));

        let pool = new_pool(&config).await.unwrap();
        assert!(!pool.hook().is_noop());
        assert_eq!(pool.pool().size(), 0);

        pool.refresh_connect_options().await.unwrap();
        pool.close().await;
    }

    /// Issues `user-N` / `pw-N`; tokens stay valid until the epoch is bumped, or
    /// for `lifetime` when one is set.
    struct RotatingProvider {
        calls: AtomicU32,
        epoch: Arc<AtomicU32>,
        lifetime: Option<Duration>,
    }

    impl RotatingProvider {
        fn new(lifetime: Option<Duration>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                epoch: Arc::new(AtomicU32::new(0)),
                lifetime,
            })
        }

        fn expire_all(&self) {
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl TokenProvider for RotatingProvider {
        fn name(&self) -> &'static str {
            "rotating"
        }

        async fn generate_token(&self) -> pg_iam_auth::Result<AuthToken> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let validity = match self.lifetime {
                Some(lifetime) => Validity::Until(SystemTime::now() + lifetime),
                None => {
                    let epoch = self.epoch.clone();
                    let issued_in = epoch.load(Ordering::SeqCst);
                    Validity::Predicate(Arc::new(move || {
                        epoch.load(Ordering::SeqCst) == issued_in
                    }))
                }
            };
            Ok(AuthToken::new(format!("pw-{}", call), validity)
                .with_username(format!("user-{}", call)))
        }
    }

    async fn wait_for_pool_user(
        pool: &AuthenticatedPool,
        expected: &str,
        limit: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while tokio::time::Instant::now() < deadline {
            if pool.pool().connect_options().get_username() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_refresh_from_any_caller_reaches_pool_options() {
        init_tracing();
        let provider = RotatingProvider::new(None);
        let config =
            Config::new("postgres://app@127.0.0.1:1/app").with_token_provider(provider.clone());
        let pool = new_pool(&config).await.unwrap();
        assert_eq!(pool.pool().connect_options().get_username(), "user-1");

        provider.expire_all();
        let token = pool
            .hook()
            .coordinator()
            .unwrap()
            .current_token()
            .await
            .unwrap();
        assert_eq!(token.username(), Some("user-2"));

        // No acquire through the wrapper: the pool follows the coordinator on its own.
        assert!(wait_for_pool_user(&pool, "user-2", Duration::from_secs(1)).await);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_pool_refreshes_before_deadline_without_callers() {
        init_tracing();
        let provider = RotatingProvider::new(Some(Duration::from_millis(200)));
        let config = Config::new("host=127.0.0.1 port=1 user=app dbname=app")
            .with_token_provider(provider.clone());
        let pool = new_pool(&config).await.unwrap();
        assert_eq!(pool.pool().connect_options().get_username(), "user-1");

        assert!(wait_for_pool_user(&pool, "user-2", Duration::from_secs(5)).await);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_queries_run_against_authenticated_pool() {
        let config = Config::new("postgres://app@127.0.0.1:1/app")
            .with_token_provider(Arc::new(StaticTokenProvider::new("pw")));
        let pool = new_pool_with(
            &config,
            PgPoolOptions::new().acquire_timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap();

        // Nothing listens on port 1; the point is that `&pool` is an executor.
        let err = sqlx::query("SELECT 1").execute(&pool).await.unwrap_err();
        assert!(!matches!(err, sqlx::Error::Configuration(_)));
        pool.close().await;
    }
}
