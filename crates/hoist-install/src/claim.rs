//! Installation claims and their storage.
//!
//! A claim is the durable record of one installation: which invocation
//! image ran, with which parameters, and how the last action ended.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::error::{InstallError, InstallResult};

/// Action recorded in a claim result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Install,
    Upgrade,
    Uninstall,
    Status,
    #[default]
    Unknown,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
            Self::Uninstall => "uninstall",
            Self::Status => "status",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Outcome recorded in a claim result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
    Underway,
    #[default]
    Unknown,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Underway => "underway",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Result of the last action on an installation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClaimResult {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub status: Status,
}

/// One installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub installation: String,

    /// Changes on every state change.
    pub revision: String,

    pub created: DateTime<Utc>,

    pub modified: DateTime<Utc>,

    /// Invocation image reference.
    #[serde(default)]
    pub bundle: String,

    #[serde(default)]
    pub image_type: String,

    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub result: ClaimResult,
}

impl Claim {
    /// Start a claim for a new installation.
    pub fn new(installation: &str) -> InstallResult<Self> {
        validate_installation_name(installation)?;
        let now = Utc::now();
        Ok(Self {
            installation: installation.to_string(),
            revision: new_revision(),
            created: now,
            modified: now,
            bundle: String::new(),
            image_type: String::new(),
            parameters: BTreeMap::new(),
            result: ClaimResult::default(),
        })
    }

    /// Record an action outcome and start a new revision.
    pub fn update(&mut self, action: Action, status: Status, message: impl Into<String>) {
        self.result = ClaimResult {
            message: message.into(),
            action,
            status,
        };
        self.revision = new_revision();
        self.modified = Utc::now();
    }
}

fn new_revision() -> String {
    Uuid::new_v4().to_string()
}

/// Names are `[A-Za-z0-9_-]+`.
pub fn validate_installation_name(name: &str) -> InstallResult<()> {
    let invalid = |reason: &str| InstallError::InvalidInstallationName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("name is required"));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(invalid("only letters, digits, '_' and '-' are allowed"));
    }
    Ok(())
}

/// Durable claim storage keyed by installation name.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Write the claim, replacing any previous one for the installation.
    async fn store(&self, claim: &Claim) -> InstallResult<()>;

    async fn read(&self, installation: &str) -> InstallResult<Claim>;

    /// Installation names, sorted.
    async fn list(&self) -> InstallResult<Vec<String>>;

    async fn delete(&self, installation: &str) -> InstallResult<()>;
}

/// Claims as `<dir>/<installation>.json`.
#[derive(Debug, Clone)]
pub struct FileClaimStore {
    dir: PathBuf,
}

impl FileClaimStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, installation: &str) -> InstallResult<PathBuf> {
        validate_installation_name(installation)?;
        Ok(self.dir.join(format!("{installation}.json")))
    }
}

#[async_trait]
impl ClaimStore for FileClaimStore {
    async fn store(&self, claim: &Claim) -> InstallResult<()> {
        let path = self.path_for(&claim.installation)?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| InstallError::io("create directory", &self.dir, e))?;

        let data = serde_json::to_vec_pretty(claim)?;
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, data)
            .await
            .map_err(|e| InstallError::io("write claim", &temp_path, e))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| InstallError::io("rename claim", &temp_path, e))?;

        debug!(
            installation = %claim.installation,
            revision = %claim.revision,
            path = %path.display(),
            "stored claim"
        );
        Ok(())
    }

    async fn read(&self, installation: &str) -> InstallResult<Claim> {
        let path = self.path_for(installation)?;
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InstallError::ClaimNotFound {
                    installation: installation.to_string(),
                })
            }
            Err(e) => return Err(InstallError::io("read claim", &path, e)),
        };
        Ok(serde_json::from_slice(&data)?)
    }

    async fn list(&self) -> InstallResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(InstallError::io("list claims in", &self.dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| InstallError::io("list claims in", &self.dir, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, installation: &str) -> InstallResult<()> {
        let path = self.path_for(installation)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(InstallError::ClaimNotFound {
                installation: installation.to_string(),
            }),
            Err(e) => Err(InstallError::io("delete claim", &path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_claim() {
        let claim = Claim::new("my_release-1").unwrap();
        assert_eq!(claim.installation, "my_release-1");
        assert_eq!(claim.result.status, Status::Unknown);
        assert_eq!(claim.created, claim.modified);
        assert!(Uuid::parse_str(&claim.revision).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        for bad in ["", "has space", "../escape", "a/b", "dot.name"] {
            assert!(
                matches!(
                    Claim::new(bad),
                    Err(InstallError::InvalidInstallationName { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_update_changes_revision() {
        let mut claim = Claim::new("app").unwrap();
        let first = claim.revision.clone();
        claim.update(Action::Install, Status::Success, "");
        assert_ne!(claim.revision, first);
        assert_eq!(claim.result.action, Action::Install);
        assert!(claim.modified >= claim.created);
    }

    #[test]
    fn test_serialized_shape() {
        let mut claim = Claim::new("app").unwrap();
        claim.image_type = "docker".to_string();
        claim.update(Action::Install, Status::Failure, "boom");
        let value = serde_json::to_value(&claim).unwrap();
        assert_eq!(value["imageType"], "docker");
        assert_eq!(value["result"]["action"], "install");
        assert_eq!(value["result"]["status"], "failure");
        assert_eq!(value["result"]["message"], "boom");
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileClaimStore::new(dir.path().join("claims"));

        let mut claim = Claim::new("web").unwrap();
        claim
            .parameters
            .insert("port".to_string(), serde_json::json!(8080));
        store.store(&claim).await.unwrap();
        store.store(&Claim::new("db").unwrap()).await.unwrap();

        assert_eq!(store.read("web").await.unwrap(), claim);
        assert_eq!(store.list().await.unwrap(), vec!["db", "web"]);
        assert!(dir.path().join("claims/web.json").is_file());

        store.delete("db").await.unwrap();
        assert!(matches!(
            store.read("db").await,
            Err(InstallError::ClaimNotFound { .. })
        ));
        assert!(matches!(
            store.delete("db").await,
            Err(InstallError::ClaimNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_store_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = FileClaimStore::new(dir.path());

        let mut claim = Claim::new("web").unwrap();
        store.store(&claim).await.unwrap();
        claim.update(Action::Upgrade, Status::Success, "");
        store.store(&claim).await.unwrap();

        let read = store.read("web").await.unwrap();
        assert_eq!(read.result.action, Action::Upgrade);
        assert_eq!(store.list().await.unwrap(), vec!["web"]);
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileClaimStore::new(dir.path().join("nope"));
        assert!(store.list().await.unwrap().is_empty());
    }
}
