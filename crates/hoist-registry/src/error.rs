//! Error types for the registry layer.

use std::path::PathBuf;

/// Registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The index has no entries under this bundle name.
    #[error("no bundle name found: {name}")]
    NoBundleName { name: String },

    /// The bundle exists but no version satisfies the constraint.
    #[error("no bundle version found for {name}-{constraint}")]
    NoBundleVersion { name: String, constraint: String },

    /// Version constraint could not be parsed.
    #[error("invalid version constraint {constraint:?}: {reason}")]
    InvalidConstraint { constraint: String, reason: String },

    /// Index document lacks an API version.
    #[error("no API version specified")]
    NoApiVersion,

    /// Invalid bundle reference format.
    #[error("invalid bundle reference: {reference} - {reason}")]
    InvalidReference { reference: String, reason: String },

    /// Neither a bundle reference nor a bundle file was given.
    #[error("a BUNDLE reference or a bundle file (-f) is required")]
    MissingBundle,

    /// Both a bundle reference and a bundle file were given.
    #[error("please use either a bundle file (-f) or a BUNDLE reference, but not both")]
    ConflictingBundleSource,

    /// Bundle manifest could not be parsed.
    #[error("invalid bundle manifest {origin}: {reason}")]
    InvalidManifest { origin: String, reason: String },

    /// Remote endpoint answered with a non-OK status.
    #[error("request to {url} responded with a non-200 status code: {status}")]
    Http { url: String, status: u16 },

    /// Network error.
    #[error("network error: {message}")]
    Network { message: String },

    /// Every mirror of an index entry failed.
    #[error("unable to fetch {name} {version}: no requests to the following URLs succeeded: {urls:?}")]
    MirrorsExhausted {
        name: String,
        version: String,
        urls: Vec<String>,
    },

    /// Invalid response from a repository.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Stored or downloaded content does not hash to the expected digest.
    #[error("digest mismatch for {subject}: expected {expected}, got {actual}")]
    DigestMismatch {
        subject: String,
        expected: String,
        actual: String,
    },

    /// The signing keyring holds no keys.
    #[error("no signing keys are present in the keyring {}", path.display())]
    EmptyKeyRing { path: PathBuf },

    /// The requested signer is not in the keyring.
    #[error("key not found in keyring: {identity}")]
    KeyNotFound { identity: String },

    /// Signature verification failed.
    #[error("signature verification failed: {reason}")]
    SignatureInvalid { reason: String },

    /// Key not trusted.
    #[error("key not trusted: {key_id}")]
    KeyNotTrusted { key_id: String },

    /// Keyring or key material could not be decoded or encoded.
    #[error("key error: {message}")]
    Key { message: String },

    /// Filesystem error.
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl RegistryError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Input and lookup problems
            Self::NoBundleName { .. }
            | Self::NoBundleVersion { .. }
            | Self::InvalidConstraint { .. }
            | Self::NoApiVersion
            | Self::InvalidReference { .. }
            | Self::MissingBundle
            | Self::ConflictingBundleSource
            | Self::InvalidManifest { .. }
            | Self::Config { .. } => 1,

            // Transport
            Self::Http { .. }
            | Self::Network { .. }
            | Self::MirrorsExhausted { .. }
            | Self::InvalidResponse { .. } => 2,

            // Integrity and trust
            Self::DigestMismatch { .. }
            | Self::EmptyKeyRing { .. }
            | Self::KeyNotFound { .. }
            | Self::SignatureInvalid { .. }
            | Self::KeyNotTrusted { .. }
            | Self::Key { .. } => 3,

            // Local storage
            Self::Io { .. } | Self::Serialization { .. } => 5,
        }
    }

    /// Whether the error means "this repository does not have it".
    ///
    /// Callers can try another repository on a lookup miss, whereas a bad
    /// constraint needs fixing by the user.
    pub fn is_lookup_miss(&self) -> bool {
        matches!(
            self,
            Self::NoBundleName { .. } | Self::NoBundleVersion { .. }
        )
    }

    /// Whether the error came from talking to a remote endpoint.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::Network { .. } | Self::MirrorsExhausted { .. }
        )
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
