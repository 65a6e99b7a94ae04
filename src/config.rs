//! Configuration Management
//!
//! Resolves the project and service account credentials, and persists the
//! local EAB credential record.

use crate::eab::EabCredential;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Project fallback when `--project` is not given
pub const PROJECT_ENV: &str = "GOOGLE_PROJECT";

/// First credentials fallback when `--credentials` is not given
pub const CREDENTIALS_ENV: &str = "GOOGLE_CREDENTIALS";

/// Second credentials fallback, conventionally a key file path
pub const APPLICATION_CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Resolved provider settings
#[derive(Clone, Default)]
pub struct ProviderConfig {
    pub project: Option<String>,
    /// Service account key JSON contents (already read from disk if a path was given)
    pub credentials: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("project", &self.project)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ProviderConfig {
    /// Resolve settings (flag > env)
    pub fn resolve(project: Option<String>, credentials: Option<String>) -> Result<Self> {
        Self::resolve_with(project, credentials, |key| std::env::var(key).ok())
    }

    pub fn resolve_with(
        project: Option<String>,
        credentials: Option<String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());

        let project = non_empty(project).or_else(|| non_empty(env(PROJECT_ENV)));
        let credentials = non_empty(credentials)
            .or_else(|| non_empty(env(CREDENTIALS_ENV)))
            .or_else(|| non_empty(env(APPLICATION_CREDENTIALS_ENV)));

        let credentials = match credentials {
            Some(value) => Some(load_path_or_contents(&value)?),
            None => None,
        };

        Ok(Self {
            project,
            credentials,
        })
    }

    pub fn require_credentials(&self) -> Result<&str> {
        self.credentials.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "Missing Google Cloud API credentials. Pass --credentials or set the \
                 {CREDENTIALS_ENV} or {APPLICATION_CREDENTIALS_ENV} environment variable"
            )
        })
    }

    pub fn require_project(&self) -> Result<&str> {
        self.project.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "Missing Google Cloud API project. Pass --project or set the {PROJECT_ENV} \
                 environment variable"
            )
        })
    }
}

/// Treat `value` as a key file path if it names an existing file (after `~`
/// expansion), otherwise as the JSON contents themselves.
pub fn load_path_or_contents(value: &str) -> Result<String> {
    let path = expand_home(value)?;
    if path.is_file() {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read credentials file {}", path.display()));
    }
    Ok(value.to_string())
}

fn expand_home(value: &str) -> Result<PathBuf> {
    match value.strip_prefix('~') {
        Some(rest) => {
            let home = dirs::home_dir().context("Failed to expand homedir of credentials file")?;
            Ok(home.join(rest.trim_start_matches(['/', '\\'])))
        }
        None => Ok(PathBuf::from(value)),
    }
}

/// On-disk home of the local EAB credential record
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/stgcp/acme_eab.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("stgcp").join("acme_eab.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored credential, if any
    pub fn load(&self) -> Result<Option<EabCredential>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file {}", self.path.display()))?;
        let credential = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file {}", self.path.display()))?;

        Ok(Some(credential))
    }

    /// Replace the stored credential.
    ///
    /// The record is written to a temporary file beside the target and
    /// renamed over it, so a failed write leaves the previous record intact.
    /// The result is owner-only on unix, even when replacing a wider file.
    pub fn save(&self, credential: &EabCredential) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory {}", dir.display()))?;

        let content = serde_json::to_string_pretty(credential)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary state file in {}", dir.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        use std::io::Write;
        temp.write_all(content.as_bytes())?;
        temp.as_file().sync_all()?;

        temp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to write state file {}", self.path.display()))?;

        Ok(())
    }

    /// Remove the stored credential. Returns whether a file was removed.
    pub fn remove(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove state file {}", self.path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eab::HmacSecret;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_flags_override_env() {
        let config = ProviderConfig::resolve_with(
            Some("flag-project".to_string()),
            Some("{\"from\":\"flag\"}".to_string()),
            env(&[(PROJECT_ENV, "env-project"), (CREDENTIALS_ENV, "{}")]),
        )
        .unwrap();

        assert_eq!(config.project.as_deref(), Some("flag-project"));
        assert_eq!(config.credentials.as_deref(), Some("{\"from\":\"flag\"}"));
    }

    #[test]
    fn test_credentials_env_order() {
        let config = ProviderConfig::resolve_with(
            None,
            None,
            env(&[(CREDENTIALS_ENV, ""), (APPLICATION_CREDENTIALS_ENV, "{\"a\":1}")]),
        )
        .unwrap();
        assert_eq!(config.credentials.as_deref(), Some("{\"a\":1}"));

        let config = ProviderConfig::resolve_with(
            None,
            None,
            env(&[(CREDENTIALS_ENV, "{\"g\":1}"), (APPLICATION_CREDENTIALS_ENV, "{\"a\":1}")]),
        )
        .unwrap();
        assert_eq!(config.credentials.as_deref(), Some("{\"g\":1}"));
    }

    #[test]
    fn test_missing_values_are_reported() {
        let config = ProviderConfig::resolve_with(None, None, env(&[])).unwrap();
        assert!(config.require_project().unwrap_err().to_string().contains(PROJECT_ENV));
        assert!(config
            .require_credentials()
            .unwrap_err()
            .to_string()
            .contains(CREDENTIALS_ENV));
    }

    #[test]
    fn test_credentials_path_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, "{\"project_id\":\"acme\"}").unwrap();

        let loaded = load_path_or_contents(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded, "{\"project_id\":\"acme\"}");
    }

    #[test]
    fn test_credentials_contents_pass_through() {
        let json = "{\"type\":\"service_account\"}";
        assert_eq!(load_path_or_contents(json).unwrap(), json);
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = ProviderConfig {
            project: Some("p".to_string()),
            credentials: Some("private".to_string()),
        };
        assert!(!format!("{config:?}").contains("private"));
    }

    #[test]
    fn test_state_file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateFile::new(dir.path().join("nested").join("acme_eab.json"));
        assert!(state.load().unwrap().is_none());

        let credential = EabCredential {
            key_id: "k1".to_string(),
            name: "n1".to_string(),
            secret: HmacSecret::new(b"hello".to_vec()),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        };
        state.save(&credential).unwrap();
        assert_eq!(state.load().unwrap(), Some(credential));

        assert!(state.remove().unwrap());
        assert!(!state.remove().unwrap());
        assert!(state.load().unwrap().is_none());
    }

    #[test]
    fn test_failed_save_keeps_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateFile::new(dir.path().join("acme_eab.json"));
        let first = EabCredential {
            key_id: "k1".to_string(),
            name: "n1".to_string(),
            secret: HmacSecret::new(b"first".to_vec()),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        };
        state.save(&first).unwrap();

        // A directory squatting on the target makes the final rename fail.
        let blocked = StateFile::new(dir.path().join("blocked"));
        std::fs::create_dir(blocked.path()).unwrap();
        std::fs::write(blocked.path().join("keep"), "x").unwrap();
        assert!(blocked.save(&first).is_err());

        assert_eq!(state.load().unwrap(), Some(first));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 2, "temporary file left behind: {leftovers:?}");
    }

    #[cfg(unix)]
    #[test]
    fn test_save_tightens_existing_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acme_eab.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let state = StateFile::new(&path);
        state
            .save(&EabCredential {
                key_id: "k".to_string(),
                name: "n".to_string(),
                secret: HmacSecret::new(vec![9]),
                created_at: Utc::now(),
            })
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_state_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let state = StateFile::new(dir.path().join("acme_eab.json"));
        state
            .save(&EabCredential {
                key_id: "k".to_string(),
                name: "n".to_string(),
                secret: HmacSecret::new(vec![1, 2, 3]),
                created_at: Utc::now(),
            })
            .unwrap();

        let mode = std::fs::metadata(state.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
