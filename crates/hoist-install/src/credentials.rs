//! Credential sets.
//!
//! A credential set file names each credential and where its value comes
//! from:
//!
//! ```yaml
//! name: production
//! credentials:
//!   - name: kubeconfig
//!     source:
//!       path: ~/.kube/config
//!   - name: token
//!     source:
//!       env: API_TOKEN
//!   - name: region
//!     source:
//!       value: eu-west-1
//! ```
//!
//! JSON files with the same shape are accepted too.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::fs;
use tracing::debug;

use crate::error::{InstallError, InstallResult};

#[derive(Debug, Deserialize)]
struct CredentialSetFile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    credentials: Vec<CredentialStrategy>,
}

#[derive(Debug, Deserialize)]
struct CredentialStrategy {
    name: String,
    source: Source,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
struct Source {
    value: Option<String>,
    env: Option<String>,
    path: Option<String>,
}

/// Resolved credential values by name.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    name: String,
    values: BTreeMap<String, String>,
}

impl CredentialSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    /// Load a credential set file and resolve every source.
    ///
    /// `None` is an empty set.
    pub async fn load(path: Option<&Path>) -> InstallResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let data = fs::read_to_string(path)
            .await
            .map_err(|e| InstallError::io("read credentials", path, e))?;
        let file: CredentialSetFile =
            serde_yaml::from_str(&data).map_err(|e| InstallError::Credentials {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut set = Self::new(file.name);
        for credential in file.credentials {
            let value = resolve_source(path, &credential).await?;
            set.values.insert(credential.name, value);
        }
        debug!(set = %set.name, credentials = set.len(), "loaded credentials");
        Ok(set)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Credential names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("name", &self.name)
            .field("credentials", &self.names())
            .finish()
    }
}

async fn resolve_source(set_path: &Path, credential: &CredentialStrategy) -> InstallResult<String> {
    let fail = |message: String| InstallError::Credentials {
        path: set_path.to_path_buf(),
        message,
    };

    let source = &credential.source;
    match (&source.value, &source.env, &source.path) {
        (Some(value), None, None) => Ok(value.clone()),
        (None, Some(var), None) => std::env::var(var).map_err(|_| {
            fail(format!(
                "environment variable {var} for credential {:?} is not set",
                credential.name
            ))
        }),
        (None, None, Some(path)) => {
            let path = expand_home(path);
            fs::read_to_string(&path).await.map_err(|e| {
                fail(format!(
                    "cannot read {} for credential {:?}: {}",
                    path.display(),
                    credential.name,
                    e
                ))
            })
        }
        _ => Err(fail(format!(
            "credential {:?} needs exactly one of value, env or path",
            credential.name
        ))),
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_no_file_is_empty_set() {
        let set = CredentialSet::load(None).await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_load_all_sources() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("kubeconfig");
        std::fs::write(&secret, "apiVersion: v1\n").unwrap();
        std::env::set_var("HOIST_TEST_TOKEN", "s3cr3t");

        let file = dir.path().join("creds.yaml");
        std::fs::write(
            &file,
            format!(
                "name: prod\ncredentials:\n  - name: kubeconfig\n    source:\n      path: {}\n  - name: token\n    source:\n      env: HOIST_TEST_TOKEN\n  - name: region\n    source:\n      value: eu-west-1\n",
                secret.display()
            ),
        )
        .unwrap();

        let set = CredentialSet::load(Some(&file)).await.unwrap();
        std::env::remove_var("HOIST_TEST_TOKEN");

        assert_eq!(set.name(), "prod");
        assert_eq!(set.get("kubeconfig"), Some("apiVersion: v1\n"));
        assert_eq!(set.get("token"), Some("s3cr3t"));
        assert_eq!(set.get("region"), Some("eu-west-1"));
        assert_eq!(set.names(), vec!["kubeconfig", "region", "token"]);
    }

    #[tokio::test]
    async fn test_json_credentials() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("creds.json");
        std::fs::write(
            &file,
            r#"{"name":"dev","credentials":[{"name":"user","source":{"value":"admin"}}]}"#,
        )
        .unwrap();

        let set = CredentialSet::load(Some(&file)).await.unwrap();
        assert_eq!(set.get("user"), Some("admin"));
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_env_var() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("creds.yaml");
        std::env::remove_var("HOIST_TEST_UNSET");
        std::fs::write(
            &file,
            "credentials:\n  - name: token\n    source:\n      env: HOIST_TEST_UNSET\n",
        )
        .unwrap();

        let err = CredentialSet::load(Some(&file)).await.unwrap_err();
        assert!(matches!(err, InstallError::Credentials { .. }));
    }

    #[tokio::test]
    async fn test_ambiguous_source() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("creds.yaml");
        std::fs::write(
            &file,
            "credentials:\n  - name: token\n    source:\n      value: a\n      env: B\n",
        )
        .unwrap();

        let err = CredentialSet::load(Some(&file)).await.unwrap_err();
        assert!(matches!(err, InstallError::Credentials { .. }));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = CredentialSet::load(Some(Path::new("/nonexistent/creds.yaml")))
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::Io { .. }));
    }

    #[test]
    fn test_debug_hides_values() {
        let mut set = CredentialSet::new("prod");
        set.insert("token", "s3cr3t");
        let debug = format!("{set:?}");
        assert!(debug.contains("token"));
        assert!(!debug.contains("s3cr3t"));
    }
}
