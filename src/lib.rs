//! stgcp
//!
//! Provisions and rotates ACME External Account Binding credentials on the
//! GCP Public CA, and looks up load balancer backend services by tags kept in
//! their description.

pub mod config;
pub mod eab;
pub mod error;
pub mod gcp;
pub mod resource;
pub mod retry;

/// Version injected at compile time via STGCP_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("STGCP_VERSION") {
    Some(v) => v,
    None => "dev",
};
