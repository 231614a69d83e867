//! Configuration and the hoist home directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{RegistryError, RegistryResult};

/// Default repository domain for references without one.
pub const DEFAULT_REPOSITORY: &str = "hub.cnlabs.io";

/// Hoist configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoistConfig {
    /// Hoist home directory.
    #[serde(default = "default_home")]
    pub home: PathBuf,

    /// Repository domain used when a reference names none.
    #[serde(default = "default_repository")]
    pub default_repository: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Check downloaded manifests against the index digest.
    #[serde(default = "default_verify_digest")]
    pub verify_digest: bool,
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".hoist"))
        .unwrap_or_else(|| PathBuf::from(".hoist"))
}

fn default_repository() -> String {
    DEFAULT_REPOSITORY.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_verify_digest() -> bool {
    true
}

impl Default for HoistConfig {
    fn default() -> Self {
        Self {
            home: default_home(),
            default_repository: default_repository(),
            timeout_secs: default_timeout(),
            verify_digest: default_verify_digest(),
        }
    }
}

impl HoistConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `HOIST_HOME` | Home directory (default `~/.hoist`) |
    /// | `HOIST_DEFAULT_REPOSITORY` | Repository domain for bare references |
    /// | `HOIST_TIMEOUT` | Request timeout in seconds |
    /// | `HOIST_VERIFY_DIGEST` | Set to `0`/`false` to skip mirror digest checks |
    pub fn from_env() -> Self {
        Self {
            home: std::env::var_os("HOIST_HOME")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_home),
            default_repository: std::env::var("HOIST_DEFAULT_REPOSITORY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(default_repository),
            timeout_secs: std::env::var("HOIST_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            verify_digest: std::env::var("HOIST_VERIFY_DIGEST")
                .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
                .unwrap_or_else(|_| default_verify_digest()),
        }
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }

    pub fn with_default_repository(mut self, domain: impl Into<String>) -> Self {
        self.default_repository = domain.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_verify_digest(mut self, verify: bool) -> Self {
        self.verify_digest = verify;
        self
    }

    pub fn home_dir(&self) -> Home {
        Home::new(&self.home)
    }
}

/// Paths inside the hoist home directory.
///
/// ```text
/// <home>/cache/         resolved manifests, <name>-<version>.json
/// <home>/bundles/       content store, one file per digest
/// <home>/claims/        installation claims, <installation>.json
/// <home>/secret.ring    signing keys
/// <home>/public.ring    trusted public keys
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Home {
    root: PathBuf,
}

impl Home {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn bundles(&self) -> PathBuf {
        self.root.join("bundles")
    }

    pub fn claims(&self) -> PathBuf {
        self.root.join("claims")
    }

    pub fn secret_keyring(&self) -> PathBuf {
        self.root.join("secret.ring")
    }

    pub fn public_keyring(&self) -> PathBuf {
        self.root.join("public.ring")
    }

    /// Create the home directory layout.
    pub async fn ensure(&self) -> RegistryResult<()> {
        for dir in [self.root.clone(), self.cache(), self.bundles(), self.claims()] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| RegistryError::io("create directory", &dir, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 4] = [
        "HOIST_HOME",
        "HOIST_DEFAULT_REPOSITORY",
        "HOIST_TIMEOUT",
        "HOIST_VERIFY_DIGEST",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = HoistConfig::from_env();
        assert_eq!(config.default_repository, "hub.cnlabs.io");
        assert_eq!(config.timeout_secs, 30);
        assert!(config.verify_digest);
        assert!(config.home.ends_with(".hoist"));
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("HOIST_HOME", "/tmp/hoist-test-home");
        std::env::set_var("HOIST_DEFAULT_REPOSITORY", "localhost:5000");
        std::env::set_var("HOIST_TIMEOUT", "5");
        std::env::set_var("HOIST_VERIFY_DIGEST", "false");

        let config = HoistConfig::from_env();
        clear_env();

        assert_eq!(config.home, PathBuf::from("/tmp/hoist-test-home"));
        assert_eq!(config.default_repository, "localhost:5000");
        assert_eq!(config.timeout_secs, 5);
        assert!(!config.verify_digest);
    }

    #[test]
    #[serial]
    fn test_invalid_timeout_falls_back() {
        clear_env();
        std::env::set_var("HOIST_TIMEOUT", "soon");
        let config = HoistConfig::from_env();
        clear_env();
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_builders() {
        let config = HoistConfig::default()
            .with_home("/srv/hoist")
            .with_default_repository("hub.example.org")
            .with_timeout_secs(3)
            .with_verify_digest(false);
        assert_eq!(config.home_dir().claims(), PathBuf::from("/srv/hoist/claims"));
        assert_eq!(config.default_repository, "hub.example.org");
        assert_eq!(config.timeout_secs, 3);
        assert!(!config.verify_digest);
    }

    #[tokio::test]
    async fn test_home_ensure() {
        let dir = tempfile::TempDir::new().unwrap();
        let home = Home::new(dir.path().join("home"));
        home.ensure().await.unwrap();
        assert!(home.cache().is_dir());
        assert!(home.bundles().is_dir());
        assert!(home.claims().is_dir());
        assert_eq!(home.secret_keyring(), dir.path().join("home/secret.ring"));
    }
}
