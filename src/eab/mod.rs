//! ACME External Account Binding credentials
//!
//! A credential is created by the Public CA and never read back: the API has
//! no get or delete operation. Rotation issues a fresh create call carrying
//! the previous credential, and the result replaces the local record.
//!
//! - [`provisioner`] - signed create/rotate calls with retry

pub mod provisioner;

pub use provisioner::{EabProvisioner, ProvisionMode};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Raw HMAC key bytes. Formatting never prints the key.
#[derive(Clone, PartialEq, Eq)]
pub struct HmacSecret(Vec<u8>);

impl HmacSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw key. Callers must avoid logging it.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    /// Standard (padded) base64 of the raw key bytes
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        STANDARD.decode(encoded).map(Self)
    }
}

impl fmt::Debug for HmacSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HmacSecret").field(&"<redacted>").finish()
    }
}

impl fmt::Display for HmacSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

// Persisted as base64 so arbitrary key bytes survive a JSON round trip.
impl Serialize for HmacSecret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for HmacSecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// An EAB credential as held locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EabCredential {
    pub key_id: String,
    pub name: String,
    #[serde(rename = "hmac_base64")]
    pub secret: HmacSecret,
    /// Local wall-clock time at which the response was decoded. The authority
    /// does not report a creation time, so this only approximates it.
    #[serde(rename = "create_at", with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

/// Outcome of asking the authority for an existing credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRead {
    /// There is no retrieval API; the local record is authoritative.
    Unsupported,
}

/// Outcome of deleting a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteDelete {
    /// The local record was discarded; nothing was revoked server-side.
    LocalOnly,
}

/// Reading back a credential is a terminal no-op.
pub fn read_remote(local: Option<&EabCredential>) -> RemoteRead {
    tracing::debug!(
        key_id = local.map(|c| c.key_id.as_str()).unwrap_or("-"),
        "Public CA has no API to read EAB credentials, keeping local state"
    );
    RemoteRead::Unsupported
}

/// Deleting a credential only drops the local record.
pub fn delete_remote(local: Option<EabCredential>) -> RemoteDelete {
    tracing::warn!(
        key_id = local.as_ref().map(|c| c.key_id.as_str()).unwrap_or("-"),
        "Public CA has no API to delete EAB credentials, the credential stays valid server-side"
    );
    RemoteDelete::LocalOnly
}
