//! AWS ECR registry credentials.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ecr::config::Credentials;
use aws_sdk_ecr::error::DisplayErrorContext;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cheops_core::{CredentialProvider, Error, ProviderConfig, RegistryCredentials, Result};
use std::sync::Arc;
use tracing::debug;

pub const PROVIDER_TYPE: &str = "aws";

/// A registry token as returned by the exchange, still base64-encoded.
#[derive(Clone)]
pub struct AuthorizationToken {
    pub token: String,
    pub proxy_endpoint: Option<String>,
}

/// Exchanges an AWS identity for a registry authorization token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn authorization_token(&self) -> Result<AuthorizationToken>;
}

/// Static key material used instead of the default AWS credential chain.
#[derive(Clone)]
pub struct StaticKeys {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// Token exchange backed by ECR `GetAuthorizationToken`.
pub struct EcrTokenExchange {
    client: aws_sdk_ecr::Client,
}

impl EcrTokenExchange {
    pub async fn new(region: &str, keys: Option<StaticKeys>) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));

        if let Some(keys) = keys {
            loader = loader.credentials_provider(Credentials::new(
                keys.access_key_id,
                keys.secret_access_key,
                keys.session_token,
                None,
                "cheops",
            ));
        }

        let sdk_config = loader.load().await;
        Self {
            client: aws_sdk_ecr::Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl TokenExchange for EcrTokenExchange {
    async fn authorization_token(&self) -> Result<AuthorizationToken> {
        let output = self
            .client
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| Error::Credentials(format!("ECR token exchange: {}", DisplayErrorContext(e))))?;

        let data = output
            .authorization_data()
            .first()
            .ok_or_else(|| Error::Credentials("ECR returned no authorization data".to_string()))?;

        let token = data
            .authorization_token()
            .ok_or_else(|| Error::Credentials("ECR returned no authorization token".to_string()))?;

        Ok(AuthorizationToken {
            token: token.to_string(),
            proxy_endpoint: data.proxy_endpoint().map(str::to_string),
        })
    }
}

/// Decode a base64 `username:password` token into registry credentials.
pub fn decode_authorization_token(
    token: &str,
    proxy_endpoint: Option<String>,
) -> Result<RegistryCredentials> {
    let decoded = STANDARD
        .decode(token.trim())
        .map_err(|e| Error::Credentials(format!("authorization token is not base64: {e}")))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| Error::Credentials("authorization token is not UTF-8".to_string()))?;

    let (username, password) = decoded
        .split_once(':')
        .filter(|(user, _)| !user.is_empty())
        .ok_or_else(|| {
            Error::Credentials("authorization token is not username:password".to_string())
        })?;

    Ok(RegistryCredentials {
        username: username.to_string(),
        password: password.to_string(),
        email: "none".to_string(),
        serveraddress: proxy_endpoint,
    })
}

/// Credential provider that fetches short-lived ECR push credentials.
pub struct EcrCredentialProvider {
    exchange: Arc<dyn TokenExchange>,
}

impl EcrCredentialProvider {
    pub fn new(exchange: Arc<dyn TokenExchange>) -> Self {
        Self { exchange }
    }

    pub async fn from_config(config: &ProviderConfig) -> Result<Self> {
        debug!(provider = %config.name, "Initializing AWS credentials provider");

        let region = config.required("region")?;
        let keys = match config.setting("access-key-id").filter(|k| !k.is_empty()) {
            None => None,
            Some(access_key_id) => Some(StaticKeys {
                access_key_id: access_key_id.to_string(),
                secret_access_key: config.required("secret-access-key")?.to_string(),
                session_token: config
                    .setting("session-token")
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
            }),
        };

        let exchange = EcrTokenExchange::new(region, keys).await;
        Ok(Self::new(Arc::new(exchange)))
    }
}

#[async_trait]
impl CredentialProvider for EcrCredentialProvider {
    fn kind(&self) -> &'static str {
        PROVIDER_TYPE
    }

    async fn get_credentials(&self) -> Result<RegistryCredentials> {
        let token = self.exchange.authorization_token().await?;
        decode_authorization_token(&token.token, token.proxy_endpoint)
    }
}
