//! EAB Provisioner
//!
//! Creates or rotates an External Account Binding key through the Public CA
//! `externalAccountKeys.create` call.
//!
//! Only transport failures are retried, and only when
//! [`classify`](crate::retry::classify) calls them transient. A completed
//! round trip with a non-200 status fails immediately, including 5xx.

use super::{EabCredential, HmacSecret};
use crate::error::{DecodeError, ProvisionError};
use crate::gcp::auth::{ServiceAccount, DEFAULT_SCOPES};
use crate::gcp::client::Endpoints;
use crate::gcp::http::{ServiceAccountSigner, SignedClientFactory};
use crate::retry::{retry_classified, RetryError, RetryPolicy};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Wire form of an external account key, used for both the rotate request
/// and the response.
#[derive(Debug, Serialize, Deserialize)]
struct ExternalAccountKey {
    #[serde(rename = "keyId")]
    key_id: String,
    name: String,
    #[serde(rename = "b64MacKey")]
    b64_mac_key: String,
}

/// Whether a call creates a first credential or replaces an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionMode {
    Create,
    Rotate,
}

impl ProvisionMode {
    fn as_str(self) -> &'static str {
        match self {
            ProvisionMode::Create => "create",
            ProvisionMode::Rotate => "rotate",
        }
    }
}

/// Request body for a call. Create sends nothing; rotate sends the prior
/// credential with its raw secret bytes re-encoded as standard base64.
pub fn request_body(prior: Option<&EabCredential>) -> Option<Vec<u8>> {
    prior.map(|prior| {
        serde_json::json!({
            "keyId": prior.key_id,
            "name": prior.name,
            "b64MacKey": prior.secret.to_base64(),
        })
        .to_string()
        .into_bytes()
    })
}

/// Decode a 200 response body into a credential stamped with the local time.
pub fn decode_response(body: &str) -> Result<EabCredential, DecodeError> {
    let key: ExternalAccountKey = serde_json::from_str(body)?;
    let secret = HmacSecret::from_base64(&key.b64_mac_key)?;

    Ok(EabCredential {
        key_id: key.key_id,
        name: key.name,
        secret,
        created_at: Utc::now(),
    })
}

/// Issues signed create/rotate calls against the Public CA.
pub struct EabProvisioner<F = ServiceAccountSigner> {
    signer: F,
    endpoints: Endpoints,
    retry_policy: RetryPolicy,
}

impl EabProvisioner<ServiceAccountSigner> {
    /// Provisioner signing with the given service account key
    pub fn new(endpoints: Endpoints) -> Self {
        Self::with_signer(ServiceAccountSigner, endpoints)
    }
}

impl<F: SignedClientFactory> EabProvisioner<F> {
    pub fn with_signer(signer: F, endpoints: Endpoints) -> Self {
        Self {
            signer,
            endpoints,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Configure custom retry behavior.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Provision a credential, rotating `prior` when given.
    ///
    /// The returned credential replaces any prior one; the authority does not
    /// modify the old key in place.
    pub async fn provision(
        &self,
        service_account_json: &str,
        prior: Option<&EabCredential>,
        cancel: &CancellationToken,
    ) -> Result<EabCredential, ProvisionError> {
        let account = ServiceAccount::from_json(service_account_json)?;
        let client = self
            .signer
            .signed_client(service_account_json, DEFAULT_SCOPES)?;
        let project = account.project()?;
        let url = self.endpoints.external_account_keys_url(project);

        let mode = if prior.is_some() {
            ProvisionMode::Rotate
        } else {
            ProvisionMode::Create
        };
        let body = request_body(prior);

        tracing::info!(
            project = %project,
            mode = mode.as_str(),
            client_email = %account.client_email,
            "Requesting EAB credential"
        );

        let reply = retry_classified(&self.retry_policy, cancel, |attempt| {
            tracing::debug!(attempt, url = %url, "Posting externalAccountKeys");
            client.post_json(&url, body.clone())
        })
        .await
        .map_err(|e| match e {
            RetryError::Permanent { attempts, error } => ProvisionError::Transport {
                url: url.clone(),
                attempts,
                source: error,
            },
            RetryError::Exhausted { attempts, error } => ProvisionError::Exhausted {
                url: url.clone(),
                attempts,
                source: error,
            },
            RetryError::Cancelled => ProvisionError::Cancelled,
        })?;

        if !reply.is_ok() {
            return Err(ProvisionError::Response {
                url,
                status: reply.status,
                body: reply.body,
            });
        }

        let credential = decode_response(&reply.body)?;

        tracing::info!(
            key_id = %credential.key_id,
            name = %credential.name,
            mode = mode.as_str(),
            "EAB credential provisioned"
        );

        Ok(credential)
    }

    /// Provision a first credential.
    pub async fn create(
        &self,
        service_account_json: &str,
        cancel: &CancellationToken,
    ) -> Result<EabCredential, ProvisionError> {
        self.provision(service_account_json, None, cancel).await
    }

    /// Replace `prior` with a freshly issued credential.
    pub async fn rotate(
        &self,
        service_account_json: &str,
        prior: &EabCredential,
        cancel: &CancellationToken,
    ) -> Result<EabCredential, ProvisionError> {
        self.provision(service_account_json, Some(prior), cancel).await
    }
}
