//! Public keys trusted to verify clear-signed bundles.
//!
//! Keys come from the local public keyring (`public.ring`) or straight from
//! a signing keyring. Every key is addressed by its key id, the SHA-256 of
//! its SPKI DER encoding.

use std::collections::HashMap;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::signature::{compute_key_id, KeyRing};

/// A trusted verification key as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedKey {
    /// Key ID (sha256:...).
    pub key_id: String,

    /// Public key (SPKI DER, Base64).
    pub public_key: String,

    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// When the key was added.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,

    /// When the key expires (if any).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PublicRingFile {
    #[serde(default)]
    keys: Vec<TrustedKey>,
}

/// Trust store for verification keys.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    /// Key ID -> VerifyingKey
    keys: HashMap<String, VerifyingKey>,

    /// Key ID -> on-disk record
    records: HashMap<String, TrustedKey>,
}

impl TrustStore {
    /// Create an empty trust store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a public keyring. A missing file is an empty store.
    pub fn load(path: &Path) -> RegistryResult<Self> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "public keyring not found");
                return Ok(Self::new());
            }
            Err(e) => return Err(RegistryError::io("read public keyring", path, e)),
        };

        let file: PublicRingFile = serde_json::from_slice(&data).map_err(|e| RegistryError::Key {
            message: format!("invalid public keyring {}: {}", path.display(), e),
        })?;

        let mut store = Self::new();
        for key in &file.keys {
            store.add_key(key)?;
        }
        Ok(store)
    }

    /// Write the store as a public keyring, ordered by key id.
    pub fn save(&self, path: &Path) -> RegistryResult<()> {
        let mut keys: Vec<TrustedKey> = self.records.values().cloned().collect();
        keys.sort_by(|a, b| a.key_id.cmp(&b.key_id));

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RegistryError::io("create directory", parent, e))?;
        }
        let json = serde_json::to_vec_pretty(&PublicRingFile { keys })?;
        std::fs::write(path, json).map_err(|e| RegistryError::io("write public keyring", path, e))
    }

    /// Trust the public half of every key in a signing keyring.
    pub fn from_keyring(ring: &KeyRing) -> RegistryResult<Self> {
        let mut store = Self::new();
        for key in ring.keys() {
            store.add_key(&TrustedKey {
                key_id: key.key_id().to_string(),
                public_key: key.public_key_b64()?,
                name: Some(key.name().to_string()),
                added_at: Some(Utc::now()),
                expires_at: None,
            })?;
        }
        Ok(store)
    }

    /// Add a key. The claimed key id must match the key material.
    pub fn add_key(&mut self, key: &TrustedKey) -> RegistryResult<()> {
        let bytes = decode_public_key_bytes(&key.public_key)?;
        let verifying_key = decode_verifying_key(&bytes)?;
        let computed_id = compute_key_id(&bytes);

        if computed_id != key.key_id {
            return Err(RegistryError::SignatureInvalid {
                reason: format!(
                    "key_id mismatch: claimed {}, computed {}",
                    key.key_id, computed_id
                ),
            });
        }

        self.keys.insert(key.key_id.clone(), verifying_key);
        self.records.insert(key.key_id.clone(), key.clone());
        Ok(())
    }

    /// Pin a key given only its id and Base64 SPKI.
    pub fn add_pinned_key(&mut self, key_id: &str, public_key_b64: &str) -> RegistryResult<()> {
        self.add_key(&TrustedKey {
            key_id: key_id.to_string(),
            public_key: public_key_b64.to_string(),
            name: None,
            added_at: Some(Utc::now()),
            expires_at: None,
        })
    }

    /// Get a usable key by ID.
    pub fn get_key(&self, key_id: &str) -> RegistryResult<VerifyingKey> {
        let key = self
            .keys
            .get(key_id)
            .ok_or_else(|| RegistryError::KeyNotTrusted {
                key_id: key_id.to_string(),
            })?;

        if let Some(expires_at) = self.records.get(key_id).and_then(|r| r.expires_at) {
            if expires_at < Utc::now() {
                return Err(RegistryError::KeyNotTrusted {
                    key_id: key_id.to_string(),
                });
            }
        }

        Ok(*key)
    }

    /// Check if a key is trusted.
    pub fn is_trusted(&self, key_id: &str) -> bool {
        self.get_key(key_id).is_ok()
    }

    /// Trusted key IDs, sorted.
    pub fn list_keys(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.keys.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Decode Base64 public key bytes.
fn decode_public_key_bytes(b64: &str) -> RegistryResult<Vec<u8>> {
    BASE64.decode(b64).map_err(|e| RegistryError::Key {
        message: format!("invalid base64 public key: {}", e),
    })
}

/// Decode SPKI DER bytes to a VerifyingKey.
fn decode_verifying_key(spki: &[u8]) -> RegistryResult<VerifyingKey> {
    use pkcs8::DecodePublicKey;

    VerifyingKey::from_public_key_der(spki).map_err(|e| RegistryError::Key {
        message: format!("invalid SPKI public key: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn generate_trusted_key(name: &str) -> TrustedKey {
        let mut ring = KeyRing::new();
        let key = ring.generate(name).unwrap();
        TrustedKey {
            key_id: key.key_id().to_string(),
            public_key: key.public_key_b64().unwrap(),
            name: Some(name.to_string()),
            added_at: Some(Utc::now()),
            expires_at: None,
        }
    }

    #[test]
    fn test_empty_trust_store() {
        let store = TrustStore::new();
        let result = store.get_key("sha256:unknown");
        assert!(matches!(result, Err(RegistryError::KeyNotTrusted { .. })));
    }

    #[test]
    fn test_add_key() {
        let mut store = TrustStore::new();
        let trusted = generate_trusted_key("alice");
        store.add_key(&trusted).unwrap();

        let key = store.get_key(&trusted.key_id).unwrap();
        assert_eq!(key.as_bytes().len(), 32);
        assert_eq!(store.list_keys(), vec![trusted.key_id]);
    }

    #[test]
    fn test_add_pinned_key() {
        let mut store = TrustStore::new();
        let trusted = generate_trusted_key("alice");
        store
            .add_pinned_key(&trusted.key_id, &trusted.public_key)
            .unwrap();
        assert!(store.is_trusted(&trusted.key_id));
        assert!(store.add_pinned_key("sha256:00", &trusted.public_key).is_err());
    }

    #[test]
    fn test_key_id_mismatch_rejected() {
        let mut store = TrustStore::new();
        let mut trusted = generate_trusted_key("alice");
        trusted.key_id =
            "sha256:0000000000000000000000000000000000000000000000000000000000000000".to_string();

        assert!(matches!(
            store.add_key(&trusted),
            Err(RegistryError::SignatureInvalid { .. })
        ));
    }

    #[test]
    fn test_expired_key_not_usable() {
        let mut store = TrustStore::new();
        let mut trusted = generate_trusted_key("alice");
        trusted.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        store.add_key(&trusted).unwrap();

        assert!(!store.is_trusted(&trusted.key_id));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("public.ring");

        let mut store = TrustStore::new();
        let a = generate_trusted_key("alice");
        let b = generate_trusted_key("bob");
        store.add_key(&a).unwrap();
        store.add_key(&b).unwrap();
        store.save(&path).unwrap();

        let loaded = TrustStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.is_trusted(&a.key_id));
        assert!(loaded.is_trusted(&b.key_id));
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = TrustStore::load(&dir.path().join("public.ring")).unwrap();
        assert!(store.is_empty());
    }
}
