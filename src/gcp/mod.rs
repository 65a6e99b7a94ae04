//! GCP API interaction module
//!
//! - [`auth`] - service account parsing and bearer token sources
//! - [`client`] - API endpoints
//! - [`http`] - signed HTTP client used by the provisioner and scanner
//!
//! # Example
//!
//! ```ignore
//! use stgcp::gcp::{auth::{GcpCredentials, DEFAULT_SCOPES}, http::GcpHttpClient};
//!
//! async fn example(json: &str) -> anyhow::Result<()> {
//!     let credentials = GcpCredentials::from_service_account_json(json, DEFAULT_SCOPES)?;
//!     let http = GcpHttpClient::new(std::sync::Arc::new(credentials))?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
