//! Repository index: every published version of every bundle.
//!
//! Canonical form keeps each name's entries sorted newest first, so the
//! 0th entry is the latest release. Entries whose version is not semver
//! sort after all others and never satisfy a constraint.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::bundle::Maintainer;
use crate::error::{RegistryError, RegistryResult};

/// v1 API version for index and entry documents.
pub const API_VERSION_V1: &str = "v1";

/// File name of the index inside a repository directory.
pub const INDEX_FILE_NAME: &str = "index.json";

/// One published version of one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    pub name: String,

    pub version: String,

    /// Project page, repository or contact.
    #[serde(default)]
    pub home: String,

    /// Mirrors of the bundle manifest, tried in order.
    #[serde(default)]
    pub urls: Vec<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub maintainers: Vec<Maintainer>,

    #[serde(default)]
    pub api_version: String,

    /// Hex SHA-256 of the manifest bytes.
    #[serde(default)]
    pub digest: String,

    /// When the entry was added to the index.
    #[serde(default, rename = "created")]
    pub created: DateTime<Utc>,
}

impl BundleEntry {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            home: String::new(),
            urls: Vec::new(),
            description: String::new(),
            keywords: Vec::new(),
            maintainers: Vec::new(),
            api_version: API_VERSION_V1.to_string(),
            digest: String::new(),
            created: Utc::now(),
        }
    }

    /// Parsed version, if the version string is semver.
    pub fn semver(&self) -> Option<Version> {
        parse_version(&self.version)
    }
}

/// The index document of a bundle repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub generated: DateTime<Utc>,

    #[serde(default)]
    pub entries: BTreeMap<String, Vec<BundleEntry>>,

    /// Key ids of the keys bundles in this repository are signed with.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_keys: Vec<String>,
}

impl Default for IndexFile {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexFile {
    /// An empty v1 index stamped with the current time.
    pub fn new() -> Self {
        Self {
            api_version: API_VERSION_V1.to_string(),
            generated: Utc::now(),
            entries: BTreeMap::new(),
            public_keys: Vec::new(),
        }
    }

    /// Parse an index document and bring it into canonical order.
    pub fn load(data: &[u8]) -> RegistryResult<Self> {
        let mut index: Self = serde_json::from_slice(data)?;
        if index.api_version.trim().is_empty() {
            return Err(RegistryError::NoApiVersion);
        }
        index.sort_entries();
        Ok(index)
    }

    pub async fn load_file(path: &Path) -> RegistryResult<Self> {
        let data = fs::read(path)
            .await
            .map_err(|e| RegistryError::io("read index", path, e))?;
        Self::load(&data)
    }

    pub fn to_json(&self) -> RegistryResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub async fn write_file(&self, path: &Path) -> RegistryResult<()> {
        let data = self.to_json()?;
        fs::write(path, data)
            .await
            .map_err(|e| RegistryError::io("write index", path, e))
    }

    /// Append an entry under its name. Does not sort or de-duplicate.
    pub fn add(&mut self, entry: BundleEntry) {
        self.entries.entry(entry.name.clone()).or_default().push(entry);
    }

    /// True iff [`IndexFile::get`] succeeds.
    pub fn has(&self, name: &str, version: &str) -> bool {
        self.get(name, version).is_ok()
    }

    /// Find the first entry (in stored order) whose version satisfies `version`.
    ///
    /// An empty constraint matches any version, so on a sorted index it
    /// yields the latest release. A full version such as `1.2.3` matches only
    /// that version; anything else is read as a semver range (`^1.2`,
    /// `>=1.0, <2`, `~0.3`).
    pub fn get(&self, name: &str, version: &str) -> RegistryResult<&BundleEntry> {
        let entries = self
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::NoBundleName {
                name: name.to_string(),
            })?;

        let no_version = || RegistryError::NoBundleVersion {
            name: name.to_string(),
            constraint: version.to_string(),
        };
        if entries.is_empty() {
            return Err(no_version());
        }

        let constraint = Constraint::parse(version)?;
        entries
            .iter()
            .find(|entry| {
                entry
                    .semver()
                    .map(|v| constraint.matches(&v))
                    .unwrap_or(false)
            })
            .ok_or_else(no_version)
    }

    /// Sort every name's entries newest first; unparsable versions trail.
    ///
    /// The sort is stable, so ties keep their relative order.
    pub fn sort_entries(&mut self) {
        for versions in self.entries.values_mut() {
            versions.sort_by_cached_key(|entry| Reverse(entry.semver()));
        }
    }

    /// Add every entry of `other` whose (name, exact version string) is not
    /// present yet.
    ///
    /// Existing entries are never replaced, so the first record of a version
    /// wins. The result may be unsorted.
    pub fn merge(&mut self, other: &IndexFile) {
        for entries in other.entries.values() {
            for entry in entries {
                if !self.contains_version(&entry.name, &entry.version) {
                    self.add(entry.clone());
                }
            }
        }
        for key in &other.public_keys {
            if !self.public_keys.contains(key) {
                self.public_keys.push(key.clone());
            }
        }
    }

    /// Whether an entry with exactly this version string exists under `name`.
    ///
    /// No semver normalization: `v2.0.0` and `2.0.0`, or two build-metadata
    /// variants, are different versions here.
    pub fn contains_version(&self, name: &str, version: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|entries| entries.iter().any(|e| e.version == version))
    }

    /// Bundle names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Bundle names containing `term`, case-insensitively, sorted.
    pub fn search(&self, term: &str) -> Vec<&str> {
        let term = term.to_lowercase();
        self.entries
            .keys()
            .filter(|name| name.to_lowercase().contains(&term))
            .map(String::as_str)
            .collect()
    }

    /// Total number of entries across all names.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Constraint {
    Any,
    Exact(Version),
    Range(VersionReq),
}

impl Constraint {
    fn parse(constraint: &str) -> RegistryResult<Self> {
        let trimmed = constraint.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::Any);
        }
        if let Ok(exact) = Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed)) {
            return Ok(Self::Exact(exact));
        }
        VersionReq::parse(trimmed)
            .map(Self::Range)
            .map_err(|e| RegistryError::InvalidConstraint {
                constraint: constraint.to_string(),
                reason: e.to_string(),
            })
    }

    fn matches(&self, version: &Version) -> bool {
        match self {
            // Same as `*`: pre-releases need an explicit constraint.
            Self::Any => version.pre.is_empty(),
            Self::Exact(wanted) => same_version(wanted, version),
            Self::Range(req) => req.matches(version),
        }
    }
}

/// Equal ignoring build metadata.
fn same_version(a: &Version, b: &Version) -> bool {
    a.major == b.major && a.minor == b.minor && a.patch == b.patch && a.pre == b.pre
}

/// Lenient semver parse: accepts a leading `v` and missing minor/patch.
pub fn parse_version(s: &str) -> Option<Version> {
    let s = s.trim();
    let s = s.strip_prefix('v').unwrap_or(s);
    if let Ok(v) = Version::parse(s) {
        return Some(v);
    }

    let split = s.find(|c| c == '-' || c == '+').unwrap_or(s.len());
    let (core, rest) = s.split_at(split);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    Version::parse(&format!("{padded}{rest}")).ok()
}
