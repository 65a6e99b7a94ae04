//! Error types
//!
//! Typed failures for credential provisioning and backend service scanning.
//! Every variant carries the context needed to diagnose it (URL, raw body, or
//! the offending string); nothing is swallowed.

use std::error::Error as StdError;
use thiserror::Error;

/// Malformed service account JSON or unusable signing material. Never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to unmarshal GCP credential JSON: {0}")]
    ServiceAccount(#[source] serde_json::Error),

    #[error("failed to build signed client from service account: {0}")]
    Signer(#[source] gcp_auth::Error),

    #[error("service account JSON does not contain a project_id")]
    MissingProject,

    #[error("failed to create HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// A request that never produced an HTTP response (connect, DNS, TLS, token
/// exchange, timeouts).
///
/// The message is the flattened error chain, since retry classification
/// inspects the text rather than a status code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build from any error, joining its `source()` chain with `": "`.
    pub fn from_chain(err: &(dyn StdError + 'static)) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = cause.source();
        }
        Self { message }
    }

    /// Build from a reqwest failure. Timeouts and name resolution failures
    /// are labelled so the classifier sees them regardless of how the
    /// underlying stack words the error.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let chained = Self::from_chain(err);
        if err.is_timeout() && !chained.message.contains("timeout") {
            return Self::new(format!("request timeout: {}", chained.message));
        }
        if is_dns_failure(err) && !chained.message.contains("DNS") {
            return Self::new(format!("DNS lookup failed: {}", chained.message));
        }
        chained
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Whether any error in the chain comes from the resolver. hyper reports
/// these as `dns error: ...`.
fn is_dns_failure(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        if text.starts_with("dns error") || text.contains("failed to lookup address") {
            return true;
        }
        current = cause.source();
    }
    false
}

/// Malformed JSON or base64 in the authority's response.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to unmarshal EAB response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to base64-decode EAB b64MacKey: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Failures of an EAB provisioning call.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transport failure classified as permanent; no retry was attempted.
    #[error("request to {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Transient transport failures outlasted the backoff policy.
    #[error("request to {url} still failing after {attempts} attempts: {source}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Non-200 status on a completed round trip. Never retried.
    #[error("url:{url}, status:{status}, error:{body}")]
    Response { url: String, status: u16, body: String },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("EAB provisioning cancelled")]
    Cancelled,
}

/// A description entry that is not `key:value`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed tag entry {entry:?} in description {description:?}, expected key:value")]
pub struct TagFormatError {
    pub entry: String,
    pub description: String,
}

/// Failures of a backend service scan. All abort the whole scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("backend service {name:?} (id {id}) has an undecodable description: {source}")]
    Format {
        id: u64,
        name: String,
        #[source]
        source: TagFormatError,
    },

    #[error("failed to list backend services from {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("url:{url}, status:{status}, error:{body}")]
    Response { url: String, status: u16, body: String },

    #[error("failed to decode backend service page from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("backend service scan cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("outer failure")]
    struct Outer(#[source] Inner);

    #[derive(Debug, Error)]
    #[error("dial tcp: lookup publicca.googleapis.com: DNS resolution failed")]
    struct Inner;

    #[test]
    fn test_transport_error_flattens_chain() {
        let err = TransportError::from_chain(&Outer(Inner));
        assert_eq!(
            err.message(),
            "outer failure: dial tcp: lookup publicca.googleapis.com: DNS resolution failed"
        );
    }

    #[derive(Debug, Error)]
    #[error("client error (Connect)")]
    struct Connect(#[source] Resolver);

    #[derive(Debug, Error)]
    #[error("dns error: failed to lookup address information: Name or service not known")]
    struct Resolver;

    #[test]
    fn test_dns_failure_found_in_chain() {
        assert!(is_dns_failure(&Connect(Resolver)));
        assert!(!is_dns_failure(&Outer(Inner)));
        assert!(!is_dns_failure(&TagFormatError {
            entry: "x".to_string(),
            description: "x".to_string(),
        }));
    }

    #[test]
    fn test_response_error_carries_url_and_body() {
        let err = ProvisionError::Response {
            url: "https://publicca.googleapis.com/v1beta1/x".to_string(),
            status: 403,
            body: "{\"error\":\"denied\"}".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("url:https://publicca.googleapis.com/v1beta1/x"));
        assert!(text.contains("{\"error\":\"denied\"}"));
    }
}
