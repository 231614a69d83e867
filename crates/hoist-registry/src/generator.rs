//! Builds a static bundle repository from a directory of manifests.
//!
//! Layout written under the repository directory:
//!
//! ```text
//! <dir>/index.json
//! <dir>/repositories/<name>/tags/<version>    one BundleEntry per file
//! ```
//!
//! The tag files are what the resolver fetches, so a plain static file
//! server in front of `<dir>` is a working repository.

use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tracing::{debug, info};
use url::Url;

use crate::bundle::Bundle;
use crate::digest::digest_bytes;
use crate::error::{RegistryError, RegistryResult};
use crate::index::{BundleEntry, IndexFile, API_VERSION_V1, INDEX_FILE_NAME};

/// Repository generator.
#[derive(Debug, Clone)]
pub struct Generator {
    dir: PathBuf,
    base_url: String,
    public_keys: Vec<String>,
}

impl Generator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            base_url: String::new(),
            public_keys: Vec::new(),
        }
    }

    /// URL prefix the mirror URLs are built from.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Key ids to advertise in the index.
    pub fn with_public_keys(mut self, keys: Vec<String>) -> Self {
        self.public_keys = keys;
        self
    }

    /// Index every manifest, write the tag files and `index.json`.
    ///
    /// The first failing manifest aborts the run; tag files written
    /// before it stay on disk.
    pub async fn generate(&self) -> RegistryResult<IndexFile> {
        let mut index = IndexFile::new();
        index.public_keys = self.public_keys.clone();

        for file in find_manifests(&self.dir)? {
            let entry = self.index_manifest(&file).await?;
            info!(name = %entry.name, version = %entry.version, "adding");

            let tag_dir = self
                .dir
                .join("repositories")
                .join(&entry.name)
                .join("tags");
            fs::create_dir_all(&tag_dir)
                .await
                .map_err(|e| RegistryError::io("create directory", &tag_dir, e))?;
            let tag_file = tag_dir.join(&entry.version);
            fs::write(&tag_file, serde_json::to_vec(&entry)?)
                .await
                .map_err(|e| RegistryError::io("write tag file", &tag_file, e))?;

            index.add(entry);
        }

        index.sort_entries();
        index.write_file(&self.dir.join(INDEX_FILE_NAME)).await?;
        debug!(bundles = index.len(), dir = %self.dir.display(), "wrote index");
        Ok(index)
    }

    async fn index_manifest(&self, file: &ManifestFile) -> RegistryResult<BundleEntry> {
        let path = &file.path;
        let data = fs::read(path)
            .await
            .map_err(|e| RegistryError::io("read bundle", path, e))?;
        let bundle = Bundle::from_slice(&data, &path.display().to_string())?;

        Ok(BundleEntry {
            urls: vec![join_url(&self.base_url, &file.relative)],
            description: bundle.description.clone().unwrap_or_default(),
            keywords: bundle.keywords.clone(),
            maintainers: bundle.maintainers.clone(),
            api_version: API_VERSION_V1.to_string(),
            digest: digest_bytes(&data),
            created: Utc::now(),
            ..BundleEntry::new(bundle.name, bundle.version)
        })
    }
}

/// Generate a repository index for `dir`, with mirrors under `base_url`.
pub async fn generate_from_directory(dir: &Path, base_url: &str) -> RegistryResult<IndexFile> {
    Generator::new(dir).with_base_url(base_url).generate().await
}

/// Merge `sources` into the index at `target`, in order, and write it back.
///
/// A missing target starts from an empty index.
pub async fn merge_index_files(target: &Path, sources: &[PathBuf]) -> RegistryResult<IndexFile> {
    let mut index = match fs::try_exists(target).await {
        Ok(true) => IndexFile::load_file(target).await?,
        Ok(false) => IndexFile::new(),
        Err(e) => return Err(RegistryError::io("stat index", target, e)),
    };

    for source in sources {
        let other = IndexFile::load_file(source).await?;
        debug!(source = %source.display(), bundles = other.len(), "merging index");
        index.merge(&other);
    }

    index.sort_entries();
    index.generated = Utc::now();
    index.write_file(target).await?;
    Ok(index)
}

/// A manifest found under the repository directory.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ManifestFile {
    path: PathBuf,
    /// `/`-separated path below the repository directory.
    relative: String,
}

/// `dir/*.json` and `dir/*/*.json`, sorted, without index files.
///
/// The relative path comes from the components the pattern matched, so it
/// does not depend on how glob spells the directory prefix.
fn find_manifests(dir: &Path) -> RegistryResult<Vec<ManifestFile>> {
    let root = glob::Pattern::escape(&dir.to_string_lossy());
    let mut files = Vec::new();

    for (depth, pattern) in [(1, format!("{root}/*.json")), (2, format!("{root}/*/*.json"))] {
        let entries = glob::glob(&pattern).map_err(|e| RegistryError::Config {
            message: format!("invalid manifest pattern {pattern}: {e}"),
        })?;
        for entry in entries {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                RegistryError::io("list", path, e.into())
            })?;
            if !path.is_file() || path.file_name().is_some_and(|n| n == INDEX_FILE_NAME) {
                continue;
            }
            let relative = relative_tail(&path, depth).ok_or_else(|| RegistryError::Config {
                message: format!("cannot place {} below {}", path.display(), dir.display()),
            })?;
            files.push(ManifestFile { path, relative });
        }
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    files.dedup_by(|a, b| a.relative == b.relative);
    Ok(files)
}

/// The last `depth` normal components of `path`, joined with `/`.
fn relative_tail(path: &Path, depth: usize) -> Option<String> {
    let names: Vec<_> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .collect();
    let start = names.len().checked_sub(depth)?;
    Some(names[start..].join("/"))
}

/// Join a relative path onto the base URL.
///
/// Falls back to plain string joining when the base is not a URL.
fn join_url(base: &str, relative: &str) -> String {
    if base.is_empty() {
        return relative.to_string();
    }

    let base_dir = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    match Url::parse(&base_dir).and_then(|u| u.join(relative)) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}/{}", base.trim_end_matches('/'), relative),
    }
}
