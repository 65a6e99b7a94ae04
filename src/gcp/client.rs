//! API endpoints
//!
//! Base URLs for the Google APIs this tool talks to, overridable so tests and
//! private endpoints can point elsewhere.

/// Public CA (Certificate Manager) API host
pub const PUBLICCA_ENDPOINT: &str = "https://publicca.googleapis.com";

/// Compute Engine API host
pub const COMPUTE_ENDPOINT: &str = "https://compute.googleapis.com";

/// Env var overriding [`PUBLICCA_ENDPOINT`]
pub const PUBLICCA_ENDPOINT_ENV: &str = "STGCP_PUBLICCA_ENDPOINT";

/// Env var overriding [`COMPUTE_ENDPOINT`]
pub const COMPUTE_ENDPOINT_ENV: &str = "STGCP_COMPUTE_ENDPOINT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub publicca: String,
    pub compute: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            publicca: PUBLICCA_ENDPOINT.to_string(),
            compute: COMPUTE_ENDPOINT.to_string(),
        }
    }
}

impl Endpoints {
    /// Defaults, with any env overrides applied
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            publicca: pick(PUBLICCA_ENDPOINT_ENV, PUBLICCA_ENDPOINT),
            compute: pick(COMPUTE_ENDPOINT_ENV, COMPUTE_ENDPOINT),
        }
    }

    /// Both APIs served from one base URL (mock servers)
    pub fn single(base: &str) -> Self {
        Self {
            publicca: base.to_string(),
            compute: base.to_string(),
        }
    }

    /// `externalAccountKeys` collection for a project
    pub fn external_account_keys_url(&self, project: &str) -> String {
        format!(
            "{}/v1beta1/projects/{}/locations/global/externalAccountKeys",
            self.publicca.trim_end_matches('/'),
            urlencoding::encode(project)
        )
    }

    /// Build Compute Engine API URL
    pub fn compute_url(&self, project: &str, path: &str) -> String {
        format!(
            "{}/compute/v1/projects/{}/{}",
            self.compute.trim_end_matches('/'),
            urlencoding::encode(project),
            path
        )
    }

    /// Global backend services collection for a project
    pub fn backend_services_url(&self, project: &str) -> String {
        self.compute_url(project, "global/backendServices")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_account_keys_url() {
        let endpoints = Endpoints::default();
        assert_eq!(
            endpoints.external_account_keys_url("acme-prod"),
            "https://publicca.googleapis.com/v1beta1/projects/acme-prod/locations/global/externalAccountKeys"
        );
    }

    #[test]
    fn test_backend_services_url() {
        let endpoints = Endpoints::single("http://127.0.0.1:8080/");
        assert_eq!(
            endpoints.backend_services_url("acme-prod"),
            "http://127.0.0.1:8080/compute/v1/projects/acme-prod/global/backendServices"
        );
    }

    #[test]
    fn test_env_overrides() {
        let endpoints = Endpoints::from_lookup(|key| match key {
            PUBLICCA_ENDPOINT_ENV => Some("http://localhost:1".to_string()),
            COMPUTE_ENDPOINT_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(endpoints.publicca, "http://localhost:1");
        assert_eq!(endpoints.compute, COMPUTE_ENDPOINT);
    }
}
