//! Content-addressed bundle store.
//!
//! Every artifact lives at `<root>/<digest>`, where the digest is taken over
//! the exact bytes of the file. Signed artifacts are stored clear-signed, so
//! their digest covers the signature block as well.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::bundle::Bundle;
use crate::digest::{digest_bytes, is_digest};
use crate::error::{RegistryError, RegistryResult};
use crate::signature::{KeyRing, Signer};

/// Local content store.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    secret_keyring: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>, secret_keyring: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            secret_keyring: secret_keyring.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an artifact with this digest is stored at.
    pub fn path_for(&self, digest: &str) -> PathBuf {
        self.root.join(digest)
    }

    /// Store `data`, clear-signed unless `insecure`, and return its digest.
    ///
    /// Signing uses the key named by `signer` (name or key id), or the first
    /// key in the secret keyring.
    pub async fn store_signed(
        &self,
        data: &[u8],
        insecure: bool,
        signer: Option<&str>,
    ) -> RegistryResult<String> {
        let content = if insecure {
            data.to_vec()
        } else {
            let ring = KeyRing::load(&self.secret_keyring)?;
            let empty = || RegistryError::EmptyKeyRing {
                path: self.secret_keyring.clone(),
            };
            if ring.is_empty() {
                return Err(empty());
            }
            let key = match signer {
                Some(identity) => ring.key(identity)?,
                None => ring.first().ok_or_else(empty)?,
            };
            debug!(key = %key.name(), key_id = %key.key_id(), "signing bundle");

            let mut signed = Signer::new(key).clearsign(data);
            signed.push(b'\n');
            signed
        };

        let digest = digest_bytes(&content);
        let path = self.path_for(&digest);
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| RegistryError::io("create directory", &self.root, e))?;
        write_atomic(&path, &content).await?;

        info!(digest = %digest, signed = !insecure, "stored bundle");
        Ok(digest)
    }

    /// Serialize a manifest and store it.
    pub async fn store_bundle(
        &self,
        bundle: &Bundle,
        insecure: bool,
        signer: Option<&str>,
    ) -> RegistryResult<String> {
        let data = bundle.to_json_vec()?;
        self.store_signed(&data, insecure, signer).await
    }

    /// Read an artifact, re-checking its digest.
    pub async fn read(&self, digest: &str) -> RegistryResult<Vec<u8>> {
        if !is_digest(digest) {
            return Err(RegistryError::InvalidReference {
                reference: digest.to_string(),
                reason: "not a sha256 hex digest".to_string(),
            });
        }

        let path = self.path_for(digest);
        let data = fs::read(&path)
            .await
            .map_err(|e| RegistryError::io("read bundle", &path, e))?;

        let actual = digest_bytes(&data);
        if actual != digest {
            return Err(RegistryError::DigestMismatch {
                subject: path.display().to_string(),
                expected: digest.to_string(),
                actual,
            });
        }
        Ok(data)
    }

    pub async fn contains(&self, digest: &str) -> bool {
        is_digest(digest) && fs::try_exists(self.path_for(digest)).await.unwrap_or(false)
    }
}

/// Write via a sibling temp file and rename, so readers never see a partial file.
pub(crate) async fn write_atomic(path: &Path, content: &[u8]) -> RegistryResult<()> {
    let temp_path = path.with_extension("tmp");

    fs::write(&temp_path, content)
        .await
        .map_err(|e| RegistryError::io("write temp file", &temp_path, e))?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| RegistryError::io("rename temp file", &temp_path, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::verify_clearsigned;
    use crate::trust::TrustStore;
    use tempfile::TempDir;

    fn setup(keys: &[&str]) -> (ContentStore, KeyRing, TempDir) {
        let dir = TempDir::new().unwrap();
        let ring_path = dir.path().join("secret.ring");
        let mut ring = KeyRing::new();
        for name in keys {
            ring.generate(name).unwrap();
        }
        if !keys.is_empty() {
            ring.save(&ring_path).unwrap();
        }
        let store = ContentStore::new(dir.path().join("bundles"), ring_path);
        (store, ring, dir)
    }

    #[tokio::test]
    async fn test_insecure_store_writes_raw_bytes() {
        let (store, _, _dir) = setup(&[]);
        let data = br#"{"name":"foo","version":"1.0.0"}"#;

        let digest = store.store_signed(data, true, None).await.unwrap();
        assert_eq!(digest, digest_bytes(data));
        assert_eq!(std::fs::read(store.path_for(&digest)).unwrap(), data);
    }

    #[tokio::test]
    async fn test_signed_store_digest_matches_file() {
        let (store, ring, _dir) = setup(&["alice"]);
        let data = br#"{"name":"foo","version":"1.0.0"}"#;

        let digest = store.store_signed(data, false, None).await.unwrap();
        let written = std::fs::read(store.path_for(&digest)).unwrap();
        assert_eq!(digest_bytes(&written), digest);
        assert_ne!(digest, digest_bytes(data));
        assert!(written.ends_with(b"\n"));

        let trust = TrustStore::from_keyring(&ring).unwrap();
        let verified = verify_clearsigned(&written, &trust).unwrap();
        assert_eq!(verified.payload, data);
        assert_eq!(verified.key_id, ring.first().unwrap().key_id());
    }

    #[tokio::test]
    async fn test_named_signer() {
        let (store, ring, _dir) = setup(&["alice", "bob"]);
        let digest = store.store_signed(b"{}", false, Some("bob")).await.unwrap();
        let written = store.read(&digest).await.unwrap();

        let trust = TrustStore::from_keyring(&ring).unwrap();
        let verified = verify_clearsigned(&written, &trust).unwrap();
        assert_eq!(verified.key_id, ring.key("bob").unwrap().key_id());
    }

    #[tokio::test]
    async fn test_empty_keyring() {
        let (store, _, _dir) = setup(&[]);
        let err = store.store_signed(b"{}", false, None).await.unwrap_err();
        assert!(matches!(err, RegistryError::EmptyKeyRing { .. }));

        let err = store.store_signed(b"{}", false, Some("alice")).await.unwrap_err();
        assert!(matches!(err, RegistryError::EmptyKeyRing { .. }));
    }

    #[tokio::test]
    async fn test_unknown_signer() {
        let (store, _, _dir) = setup(&["alice"]);
        let err = store.store_signed(b"{}", false, Some("carol")).await.unwrap_err();
        assert!(matches!(err, RegistryError::KeyNotFound { .. }));
    }

    #[tokio::test]
    async fn test_read_detects_corruption() {
        let (store, _, _dir) = setup(&[]);
        let digest = store.store_signed(b"original", true, None).await.unwrap();
        assert!(store.contains(&digest).await);

        std::fs::write(store.path_for(&digest), b"tampered").unwrap();
        let err = store.read(&digest).await.unwrap_err();
        assert!(matches!(err, RegistryError::DigestMismatch { .. }));
    }

    #[tokio::test]
    async fn test_read_rejects_non_digest() {
        let (store, _, _dir) = setup(&[]);
        assert!(store.read("../secret.ring").await.is_err());
        assert!(!store.contains("../secret.ring").await);
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temp_files() {
        let (store, _, _dir) = setup(&[]);
        store.store_signed(b"a", true, None).await.unwrap();
        store.store_signed(b"b", true, None).await.unwrap();

        for entry in std::fs::read_dir(store.root()).unwrap() {
            let name = entry.unwrap().file_name();
            assert!(!name.to_string_lossy().ends_with(".tmp"));
        }
    }
}
