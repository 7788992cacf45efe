//! Connection surfaces backed by one [`TokenCoordinator`] per configuration.
//!
//! Every entry point validates the config before touching the network. Standard
//! auth skips the coordinator entirely and uses the connection string as given.

mod conn_string;
mod connector;
mod hook;
mod pool;

pub use conn_string::{
    is_url, parse_connect_options, parse_dsn, query_escape, substitute_credentials,
    substitute_password,
};
pub use connector::Connector;
pub use hook::BeforeConnect;
pub use pool::AuthenticatedPool;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use crate::Result;
use crate::auth::{TokenCoordinator, build_provider};
use crate::config::Config;

/// Build the pre-connect hook, fetching the first token eagerly.
pub async fn before_connect(config: &Config) -> Result<BeforeConnect> {
    config.validate()?;

    match build_provider(config)? {
        None => Ok(BeforeConnect::noop()),
        Some(provider) => {
            let coordinator = TokenCoordinator::init(provider, config.fetcher()).await?;
            Ok(BeforeConnect::new(Arc::new(coordinator)))
        }
    }
}

pub async fn connector(config: &Config) -> Result<Connector> {
    config.validate()?;
    let base = parse_connect_options(config.conn_string())?;
    let hook = before_connect(config).await?;
    Ok(Connector::new(base, hook))
}

/// Pool with default [`PgPoolOptions`].
pub async fn new_pool(config: &Config) -> Result<AuthenticatedPool> {
    new_pool_with(config, PgPoolOptions::new()).await
}

pub async fn new_pool_with(
    config: &Config,
    pool_options: PgPoolOptions,
) -> Result<AuthenticatedPool> {
    config.validate()?;
    let base = parse_connect_options(config.conn_string())?;
    let hook = before_connect(config).await?;
    AuthenticatedPool::new(pool_options, base, hook).await
}

/// Connection string with a freshly fetched token as its password.
///
/// Each call performs one fetch through the retry policy; the result is not cached.
pub async fn authenticated_conn_string(config: &Config) -> Result<String> {
    config.validate()?;

    let Some(provider) = build_provider(config)? else {
        return Ok(config.conn_string().to_string());
    };

    let token = config.fetcher().fetch(provider.as_ref()).await?;
    substitute_credentials(config.conn_string(), token.username(), token.expose())
}
