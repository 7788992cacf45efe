//! AWS RDS IAM authentication.
//!
//! An RDS auth token is a SigV4 presigned `connect` request for the `rds-db`
//! service, scoped to one host, port and database user. Signing happens locally;
//! the only remote call is resolving the AWS credentials themselves.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sigv4::http_request::{
    SignableBody, SignableRequest, SignatureLocation, SigningSettings, sign,
};
use aws_sigv4::sign::v4::SigningParams;
use aws_smithy_runtime_api::client::identity::Identity;
use url::Url;

use crate::auth::{AuthToken, TokenProvider, Validity};
use crate::{Error, Result};

const PROVIDER: &str = "aws";
const SIGNING_NAME: &str = "rds-db";
const TOKEN_LIFETIME: Duration = Duration::from_secs(15 * 60);
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Builds RDS IAM auth tokens for one `host:port` and database user.
#[derive(Clone)]
pub struct AwsTokenProvider {
    host: String,
    port: u16,
    user: String,
    region: String,
    credentials: SharedCredentialsProvider,
}

impl std::fmt::Debug for AwsTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsTokenProvider")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl AwsTokenProvider {
    /// Create from an SDK config that carries both a region and credentials.
    pub fn new(
        sdk_config: &SdkConfig,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
    ) -> Result<Self> {
        validate_sdk_config(Some(sdk_config))?;

        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .ok_or_else(|| Error::config("aws region is required for AWS authentication"))?;
        let credentials = sdk_config
            .credentials_provider()
            .ok_or_else(|| Error::config("aws credentials are required for AWS authentication"))?;

        Ok(Self::from_parts(region, credentials, host, port, user))
    }

    pub fn from_parts(
        region: impl Into<String>,
        credentials: SharedCredentialsProvider,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            region: region.into(),
            credentials,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn build_auth_token(&self) -> Result<String> {
        let creds = self
            .credentials
            .provide_credentials()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("resolving aws credentials: {}", e)))?;

        let identity = Identity::new(creds.clone(), creds.expiry());

        let mut settings = SigningSettings::default();
        settings.signature_location = SignatureLocation::QueryParams;
        settings.expires_in = Some(TOKEN_LIFETIME);

        let signing_params = SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(SIGNING_NAME)
            .time(SystemTime::now())
            .settings(settings)
            .build()
            .map_err(|e| Error::provider(PROVIDER, e.to_string()))?;

        let mut url = Url::parse(&format!("https://{}/", self.endpoint()))
            .map_err(|e| Error::config(format!("invalid aws db endpoint: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("Action", "connect")
            .append_pair("DBUser", &self.user);

        let signable_request = SignableRequest::new(
            "GET",
            url.as_str(),
            std::iter::empty::<(&str, &str)>(),
            SignableBody::Bytes(&[]),
        )
        .map_err(|e| Error::provider(PROVIDER, e.to_string()))?;

        let (signing_instructions, _) = sign(signable_request, &signing_params.into())
            .map_err(|e| Error::provider(PROVIDER, e.to_string()))?
            .into_parts();

        {
            let mut query = url.query_pairs_mut();
            for (name, value) in signing_instructions.params() {
                query.append_pair(name, value);
            }
        }

        Ok(url.as_str().trim_start_matches("https://").to_string())
    }
}

#[async_trait]
impl TokenProvider for AwsTokenProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn generate_token(&self) -> Result<AuthToken> {
        let token = self.build_auth_token().await?;

        // RDS accepts the token for 15 minutes; stop handing it out a minute early.
        Ok(AuthToken::new(
            token,
            Validity::for_lifetime(TOKEN_LIFETIME, EXPIRY_MARGIN),
        ))
    }
}

/// Check that an SDK config can sign RDS tokens.
pub fn validate_sdk_config(sdk_config: Option<&SdkConfig>) -> Result<()> {
    let sdk_config = sdk_config
        .ok_or_else(|| Error::config("aws config is required for AWS authentication"))?;

    if sdk_config.region().is_none() {
        return Err(Error::config("aws region is required for AWS authentication"));
    }

    if sdk_config.credentials_provider().is_none() {
        return Err(Error::config(
            "aws credentials are required for AWS authentication",
        ));
    }

    Ok(())
}
