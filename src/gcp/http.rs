//! HTTP utilities for GCP REST API calls
//!
//! [`GcpHttpClient`] attaches a bearer token to every request. It reports
//! transport failures as [`TransportError`] and hands back every completed
//! response, whatever its status, so callers decide what a non-200 means.

use super::auth::TokenSource;
use crate::error::{ConfigError, TransportError};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// A completed HTTP round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// HTTP client whose requests carry a valid bearer token.
#[async_trait]
pub trait SignedClient: Send + Sync {
    /// POST `body` (or nothing) as `application/json`.
    async fn post_json(&self, url: &str, body: Option<Vec<u8>>)
        -> Result<HttpReply, TransportError>;

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpReply, TransportError>;
}

/// Builds a [`SignedClient`] from a service account key.
pub trait SignedClientFactory: Send + Sync {
    fn signed_client(
        &self,
        service_account_json: &str,
        scopes: &'static [&'static str],
    ) -> Result<Box<dyn SignedClient>, ConfigError>;
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
    tokens: Arc<dyn TokenSource>,
}

impl GcpHttpClient {
    /// Create a new HTTP client
    pub fn new(tokens: Arc<dyn TokenSource>) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .user_agent(format!("stgcp/{}", crate::VERSION))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self::with_client(client, tokens))
    }

    pub fn with_client(client: Client, tokens: Arc<dyn TokenSource>) -> Self {
        Self { client, tokens }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<HttpReply, TransportError> {
        let token = self.tokens.access_token().await?;

        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;

        if status != 200 {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
        }

        Ok(HttpReply { status, body })
    }
}

#[async_trait]
impl SignedClient for GcpHttpClient {
    async fn post_json(
        &self,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<HttpReply, TransportError> {
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(url).header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.body(body);
        }

        self.send(request).await
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpReply, TransportError> {
        tracing::debug!("GET {}", url);

        self.send(self.client.get(url).query(query)).await
    }
}

/// Factory signing requests with the service account key it is given.
#[derive(Clone, Default)]
pub struct ServiceAccountSigner;

impl SignedClientFactory for ServiceAccountSigner {
    fn signed_client(
        &self,
        service_account_json: &str,
        scopes: &'static [&'static str],
    ) -> Result<Box<dyn SignedClient>, ConfigError> {
        let credentials =
            super::auth::GcpCredentials::from_service_account_json(service_account_json, scopes)?;
        Ok(Box::new(GcpHttpClient::new(Arc::new(credentials))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(MAX_LOG_BODY_LENGTH)));
        assert!(sanitized.ends_with("[truncated, 500 bytes total]"));
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize_for_log("line\none\r\t"), "lineone");
    }

    #[test]
    fn test_reply_ok_only_for_200() {
        let reply = |status| HttpReply {
            status,
            body: String::new(),
        };
        assert!(reply(200).is_ok());
        assert!(!reply(201).is_ok());
        assert!(!reply(500).is_ok());
    }

    #[test]
    fn test_signer_rejects_invalid_key_material() {
        let result = ServiceAccountSigner.signed_client("{}", super::super::auth::DEFAULT_SCOPES);
        assert!(matches!(result, Err(ConfigError::Signer(_))));
    }
}
