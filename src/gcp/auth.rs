//! GCP Authentication
//!
//! Parses service account keys and produces bearer tokens, either from a
//! service account key (JWT grant), Application Default Credentials, or a
//! pre-issued static token.

use crate::error::{ConfigError, TransportError};
use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// OAuth scope granting access to all Cloud Platform APIs
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Default scopes for GCP API access
pub const DEFAULT_SCOPES: &[&str] = &[CLOUD_PLATFORM_SCOPE];

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Service account key file, as downloaded from the IAM console.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    #[serde(rename = "type", default)]
    pub account_type: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: String,
    #[serde(default)]
    private_key: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub auth_uri: String,
    #[serde(default)]
    pub token_uri: String,
    #[serde(default)]
    pub auth_provider_x509_cert_url: String,
    #[serde(default)]
    pub client_x509_cert_url: String,
}

impl ServiceAccount {
    /// Parse a service account key. Fails only on malformed JSON; missing
    /// fields surface later when signing.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::ServiceAccount)
    }

    /// Project that owns the account, required for project-scoped endpoints.
    pub fn project(&self) -> Result<&str, ConfigError> {
        if self.project_id.is_empty() {
            Err(ConfigError::MissingProject)
        } else {
            Ok(&self.project_id)
        }
    }
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let private_key = if self.private_key.is_empty() {
            "<empty>"
        } else {
            "<redacted>"
        };
        f.debug_struct("ServiceAccount")
            .field("type", &self.account_type)
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &private_key)
            .field("client_email", &self.client_email)
            .finish_non_exhaustive()
    }
}

/// Something that can hand out a bearer token for outgoing requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, TransportError>;
}

/// A fixed, externally issued access token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, TransportError> {
        Ok(self.0.clone())
    }
}

/// GCP credentials holder with token caching
#[derive(Clone)]
pub struct GcpCredentials {
    provider: Arc<dyn TokenProvider>,
    scopes: &'static [&'static str],
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl GcpCredentials {
    /// Credentials signed with a service account key (JWT bearer grant).
    pub fn from_service_account_json(
        json: &str,
        scopes: &'static [&'static str],
    ) -> Result<Self, ConfigError> {
        let account = CustomServiceAccount::from_json(json).map_err(ConfigError::Signer)?;
        Ok(Self::with_provider(Arc::new(account), scopes))
    }

    /// Application Default Credentials (env key file, gcloud, metadata server).
    pub async fn application_default(scopes: &'static [&'static str]) -> Result<Self, ConfigError> {
        let provider = gcp_auth::provider().await.map_err(ConfigError::Signer)?;
        Ok(Self::with_provider(provider, scopes))
    }

    pub fn with_provider(provider: Arc<dyn TokenProvider>, scopes: &'static [&'static str]) -> Self {
        Self {
            provider,
            scopes,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get an access token, reusing the cached one while it is valid
    pub async fn get_token(&self) -> Result<String, TransportError> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = self
            .provider
            .token(self.scopes)
            .await
            .map_err(|e| TransportError::from_chain(&e))?;
        let token_str = token.as_str().to_string();

        let expires_at = Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER;
        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token_str.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            (DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token_str)
    }
}

#[async_trait]
impl TokenSource for GcpCredentials {
    async fn access_token(&self) -> Result<String, TransportError> {
        self.get_token().await
    }
}
