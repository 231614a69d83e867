//! Signing keyring and clear-signed messages.
//!
//! A clear-signed message keeps the payload readable and appends an
//! ed25519 signature over the DSSE pre-authentication encoding of the payload:
//!
//! ```text
//! -----BEGIN HOIST SIGNED MESSAGE-----
//! Key-Id: sha256:<hex of SPKI DER>
//!
//! <payload bytes, verbatim>
//! -----BEGIN HOIST SIGNATURE-----
//! <base64 signature>
//! -----END HOIST SIGNATURE-----
//! ```

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::digest::digest_bytes;
use crate::error::{RegistryError, RegistryResult};
use crate::trust::TrustStore;

/// Payload type bound into every signature.
pub const PAYLOAD_TYPE_BUNDLE_V1: &str = "application/vnd.hoist.bundle+json;v=1";

const BEGIN_MESSAGE: &[u8] = b"-----BEGIN HOIST SIGNED MESSAGE-----\n";
const BEGIN_SIGNATURE: &[u8] = b"\n-----BEGIN HOIST SIGNATURE-----\n";
const END_SIGNATURE: &str = "-----END HOIST SIGNATURE-----";
const KEY_ID_HEADER: &str = "Key-Id: ";

/// A named signing key.
#[derive(Clone)]
pub struct NamedKey {
    name: String,
    key_id: String,
    signing_key: SigningKey,
}

impl NamedKey {
    fn new(name: impl Into<String>, signing_key: SigningKey) -> RegistryResult<Self> {
        let key_id = compute_key_id_from_key(&signing_key.verifying_key())?;
        Ok(Self {
            name: name.into(),
            key_id,
            signing_key,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Base64 SPKI DER encoding of the public half.
    pub fn public_key_b64(&self) -> RegistryResult<String> {
        use pkcs8::EncodePublicKey;
        let doc = self
            .verifying_key()
            .to_public_key_der()
            .map_err(|e| RegistryError::Key {
                message: format!("failed to encode public key: {}", e),
            })?;
        Ok(BASE64.encode(doc.as_bytes()))
    }
}

impl std::fmt::Debug for NamedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedKey")
            .field("name", &self.name)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyRecord {
    name: String,
    /// PKCS#8 PEM.
    private_key: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyRingFile {
    #[serde(default)]
    keys: Vec<KeyRecord>,
}

/// Ordered set of signing keys. The first key is the default signer.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    keys: Vec<NamedKey>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a keyring file. A missing file is an empty ring.
    pub fn load(path: &Path) -> RegistryResult<Self> {
        use pkcs8::DecodePrivateKey;

        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "keyring not found, using empty ring");
                return Ok(Self::new());
            }
            Err(e) => return Err(RegistryError::io("read keyring", path, e)),
        };

        let file: KeyRingFile = serde_json::from_slice(&data).map_err(|e| RegistryError::Key {
            message: format!("invalid keyring {}: {}", path.display(), e),
        })?;

        let mut keys = Vec::with_capacity(file.keys.len());
        for record in file.keys {
            let signing_key =
                SigningKey::from_pkcs8_pem(&record.private_key).map_err(|e| RegistryError::Key {
                    message: format!("invalid private key {:?}: {}", record.name, e),
                })?;
            keys.push(NamedKey::new(record.name, signing_key)?);
        }

        Ok(Self { keys })
    }

    /// Write the keyring with owner-only permissions.
    pub fn save(&self, path: &Path) -> RegistryResult<()> {
        use pkcs8::{EncodePrivateKey, LineEnding};

        let mut file = KeyRingFile::default();
        for key in &self.keys {
            let pem = key
                .signing_key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| RegistryError::Key {
                    message: format!("failed to encode private key {:?}: {}", key.name, e),
                })?;
            file.keys.push(KeyRecord {
                name: key.name.clone(),
                private_key: pem.as_str().to_owned(),
            });
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RegistryError::io("create directory", parent, e))?;
        }
        let json = serde_json::to_vec_pretty(&file)?;
        std::fs::write(path, json).map_err(|e| RegistryError::io("write keyring", path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| RegistryError::io("set permissions on", path, e))?;
        }

        Ok(())
    }

    /// Generate a fresh key and append it to the ring.
    pub fn generate(&mut self, name: &str) -> RegistryResult<&NamedKey> {
        if name.trim().is_empty() {
            return Err(RegistryError::Key {
                message: "key name cannot be empty".to_string(),
            });
        }
        if self.keys.iter().any(|k| k.name == name) {
            return Err(RegistryError::Key {
                message: format!("a key named {:?} already exists", name),
            });
        }

        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        self.keys.push(NamedKey::new(name, signing_key)?);
        Ok(self.keys.last().expect("key was just pushed"))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[NamedKey] {
        &self.keys
    }

    pub fn first(&self) -> Option<&NamedKey> {
        self.keys.first()
    }

    /// Key ids of every key, in ring order.
    pub fn public_keys(&self) -> Vec<String> {
        self.keys.iter().map(|k| k.key_id.clone()).collect()
    }

    /// Find a key by name or key id.
    pub fn key(&self, identity: &str) -> RegistryResult<&NamedKey> {
        self.keys
            .iter()
            .find(|k| k.name == identity || k.key_id == identity)
            .ok_or_else(|| RegistryError::KeyNotFound {
                identity: identity.to_string(),
            })
    }
}

/// Produces clear-signed messages with one key.
pub struct Signer<'a> {
    key: &'a NamedKey,
}

impl<'a> Signer<'a> {
    pub fn new(key: &'a NamedKey) -> Self {
        Self { key }
    }

    /// Clear-sign `payload`. The result has no trailing newline.
    pub fn clearsign(&self, payload: &[u8]) -> Vec<u8> {
        let pae = build_pae(PAYLOAD_TYPE_BUNDLE_V1, payload);
        let signature = self.key.signing_key.sign(&pae);

        let mut out = Vec::with_capacity(payload.len() + 256);
        out.extend_from_slice(BEGIN_MESSAGE);
        out.extend_from_slice(KEY_ID_HEADER.as_bytes());
        out.extend_from_slice(self.key.key_id.as_bytes());
        out.extend_from_slice(b"\n\n");
        out.extend_from_slice(payload);
        out.extend_from_slice(BEGIN_SIGNATURE);
        out.extend_from_slice(BASE64.encode(signature.to_bytes()).as_bytes());
        out.push(b'\n');
        out.extend_from_slice(END_SIGNATURE.as_bytes());
        out
    }
}

/// Payload and signer of a verified message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedMessage {
    pub payload: Vec<u8>,
    pub key_id: String,
}

/// Parsed but unverified clear-signed message.
struct ClearSigned<'a> {
    key_id: &'a str,
    payload: &'a [u8],
    signature_b64: &'a str,
}

/// Whether `data` looks like a clear-signed message.
pub fn is_clearsigned(data: &[u8]) -> bool {
    data.starts_with(BEGIN_MESSAGE)
}

/// Verify a clear-signed message against the trust store.
pub fn verify_clearsigned(data: &[u8], trust_store: &TrustStore) -> RegistryResult<VerifiedMessage> {
    let parsed = parse_clearsigned(data)?;

    let key = trust_store.get_key(parsed.key_id)?;

    let signature_bytes =
        BASE64
            .decode(parsed.signature_b64)
            .map_err(|e| RegistryError::SignatureInvalid {
                reason: format!("invalid base64 signature: {}", e),
            })?;
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|e| RegistryError::SignatureInvalid {
            reason: format!("invalid signature bytes: {}", e),
        })?;

    let pae = build_pae(PAYLOAD_TYPE_BUNDLE_V1, parsed.payload);
    key.verify(&pae, &signature)
        .map_err(|_| RegistryError::SignatureInvalid {
            reason: "ed25519 verification failed".to_string(),
        })?;

    Ok(VerifiedMessage {
        payload: parsed.payload.to_vec(),
        key_id: parsed.key_id.to_string(),
    })
}

fn parse_clearsigned(data: &[u8]) -> RegistryResult<ClearSigned<'_>> {
    let invalid = |reason: &str| RegistryError::SignatureInvalid {
        reason: reason.to_string(),
    };

    let rest = data
        .strip_prefix(BEGIN_MESSAGE)
        .ok_or_else(|| invalid("missing signed message header"))?;

    let header_end = find(rest, b"\n\n").ok_or_else(|| invalid("missing header terminator"))?;
    let headers =
        std::str::from_utf8(&rest[..header_end]).map_err(|_| invalid("headers are not UTF-8"))?;
    let key_id = headers
        .lines()
        .find_map(|line| line.strip_prefix(KEY_ID_HEADER))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| invalid("missing Key-Id header"))?;

    let body = &rest[header_end + 2..];
    let sig_start = rfind(body, BEGIN_SIGNATURE).ok_or_else(|| invalid("missing signature block"))?;
    let payload = &body[..sig_start];

    let trailer = std::str::from_utf8(&body[sig_start + BEGIN_SIGNATURE.len()..])
        .map_err(|_| invalid("signature block is not UTF-8"))?;
    let signature_b64 = trailer
        .trim_end()
        .strip_suffix(END_SIGNATURE)
        .map(str::trim)
        .ok_or_else(|| invalid("missing signature terminator"))?;

    Ok(ClearSigned {
        key_id,
        payload,
        signature_b64,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}

/// Build DSSE Pre-Authentication Encoding (PAE).
///
/// ```text
/// PAE(type, payload) = "DSSEv1" SP LEN(type) SP type SP LEN(payload) SP payload
/// ```
fn build_pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let type_len = payload_type.len().to_string();
    let payload_len = payload.len().to_string();

    let mut pae = Vec::new();
    pae.extend_from_slice(b"DSSEv1 ");
    pae.extend_from_slice(type_len.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload_type.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload_len.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload);
    pae
}

/// Compute key ID from public key bytes (SPKI DER).
pub fn compute_key_id(spki_bytes: &[u8]) -> String {
    format!("sha256:{}", digest_bytes(spki_bytes))
}

/// Compute key ID from a VerifyingKey.
pub fn compute_key_id_from_key(key: &VerifyingKey) -> RegistryResult<String> {
    use pkcs8::EncodePublicKey;
    let doc = key.to_public_key_der().map_err(|e| RegistryError::Key {
        message: format!("failed to encode public key: {}", e),
    })?;
    Ok(compute_key_id(doc.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ring_with(names: &[&str]) -> KeyRing {
        let mut ring = KeyRing::new();
        for name in names {
            ring.generate(name).unwrap();
        }
        ring
    }

    #[test]
    fn test_build_pae() {
        let pae = build_pae("t", b"abc");
        assert_eq!(pae, b"DSSEv1 1 t 3 abc");
    }

    #[test]
    fn test_keyring_save_load_preserves_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secret.ring");
        let ring = ring_with(&["alice", "bob"]);
        ring.save(&path).unwrap();

        let loaded = KeyRing::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.first().unwrap().name(), "alice");
        assert_eq!(loaded.keys()[1].key_id(), ring.keys()[1].key_id());
    }

    #[test]
    fn test_keyring_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ring = KeyRing::load(&dir.path().join("absent.ring")).unwrap();
        assert!(ring.is_empty());
    }

    #[test]
    fn test_keyring_lookup_by_name_and_id() {
        let ring = ring_with(&["alice", "bob"]);
        let bob_id = ring.keys()[1].key_id().to_string();
        assert_eq!(ring.key("bob").unwrap().name(), "bob");
        assert_eq!(ring.key(&bob_id).unwrap().name(), "bob");
        assert!(matches!(
            ring.key("carol"),
            Err(RegistryError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_keyring_rejects_duplicate_name() {
        let mut ring = ring_with(&["alice"]);
        assert!(matches!(
            ring.generate("alice"),
            Err(RegistryError::Key { .. })
        ));
    }

    #[test]
    fn test_clearsign_roundtrip() {
        let ring = ring_with(&["alice"]);
        let key = ring.first().unwrap();
        let payload = br#"{"name":"foo","version":"1.0.0"}"#;

        let signed = Signer::new(key).clearsign(payload);
        assert!(is_clearsigned(&signed));
        // Payload stays readable.
        assert!(find(&signed, payload).is_some());

        let trust = TrustStore::from_keyring(&ring).unwrap();
        let verified = verify_clearsigned(&signed, &trust).unwrap();
        assert_eq!(verified.payload, payload);
        assert_eq!(verified.key_id, key.key_id());
    }

    #[test]
    fn test_clearsign_tolerates_trailing_newline_and_payload_newlines() {
        let ring = ring_with(&["alice"]);
        let payload = b"line one\n\nline two\n";
        let mut signed = Signer::new(ring.first().unwrap()).clearsign(payload);
        signed.push(b'\n');

        let trust = TrustStore::from_keyring(&ring).unwrap();
        let verified = verify_clearsigned(&signed, &trust).unwrap();
        assert_eq!(verified.payload, payload);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let ring = ring_with(&["alice"]);
        let signed = Signer::new(ring.first().unwrap()).clearsign(b"{\"version\":\"1.0.0\"}");
        let tampered = String::from_utf8(signed)
            .unwrap()
            .replace("1.0.0", "6.6.6")
            .into_bytes();

        let trust = TrustStore::from_keyring(&ring).unwrap();
        assert!(matches!(
            verify_clearsigned(&tampered, &trust),
            Err(RegistryError::SignatureInvalid { .. })
        ));
    }

    #[test]
    fn test_untrusted_signer_rejected() {
        let signer_ring = ring_with(&["mallory"]);
        let trusted_ring = ring_with(&["alice"]);
        let signed = Signer::new(signer_ring.first().unwrap()).clearsign(b"{}");

        let trust = TrustStore::from_keyring(&trusted_ring).unwrap();
        assert!(matches!(
            verify_clearsigned(&signed, &trust),
            Err(RegistryError::KeyNotTrusted { .. })
        ));
    }

    #[test]
    fn test_malformed_message_rejected() {
        let trust = TrustStore::new();
        for data in [
            &b"plain bytes"[..],
            b"-----BEGIN HOIST SIGNED MESSAGE-----\nno terminator",
            b"-----BEGIN HOIST SIGNED MESSAGE-----\nKey-Id: x\n\npayload without block",
        ] {
            assert!(matches!(
                verify_clearsigned(data, &trust),
                Err(RegistryError::SignatureInvalid { .. })
            ));
        }
    }

    #[test]
    fn test_key_id_format() {
        let ring = ring_with(&["alice"]);
        let id = ring.first().unwrap().key_id();
        assert!(id.starts_with("sha256:"));
        assert_eq!(id.len(), "sha256:".len() + 64);
    }
}
