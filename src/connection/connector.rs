use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::ConnectOptions;

use super::BeforeConnect;
use crate::Result;

/// Opens single, unpooled connections with a fresh token each time.
#[derive(Debug, Clone)]
pub struct Connector {
    base: PgConnectOptions,
    hook: BeforeConnect,
}

impl Connector {
    pub fn new(base: PgConnectOptions, hook: BeforeConnect) -> Self {
        Self { base, hook }
    }

    /// Connect options as they would be used for the next connection.
    pub async fn connect_options(&self) -> Result<PgConnectOptions> {
        self.hook.apply(self.base.clone()).await
    }

    pub async fn connect(&self) -> Result<PgConnection> {
        let options = self.connect_options().await?;
        tracing::debug!(host = options.get_host(), "opening database connection");
        Ok(options.connect().await?)
    }

    pub fn hook(&self) -> &BeforeConnect {
        &self.hook
    }
}
