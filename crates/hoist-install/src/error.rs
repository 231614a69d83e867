//! Error types for installation.

use std::path::PathBuf;

use hoist_registry::RegistryError;

/// Installation errors.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// Resolving, loading or storing a bundle failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Parameter file extension has no decoder.
    #[error("no decoder for {ext:?}")]
    NoDecoder { ext: String },

    /// Installation names become file names and must stay simple.
    #[error("invalid installation name {name:?}: {reason}")]
    InvalidInstallationName { name: String, reason: String },

    /// Docker and OCI invocation images must carry a tag.
    #[error("version is required for invocation image {image:?}")]
    MissingImageVersion { image: String },

    /// No driver is registered under this name.
    #[error("unknown driver {name:?} (available: {})", available.join(", "))]
    UnknownDriver { name: String, available: Vec<String> },

    /// The driver cannot run this kind of invocation image.
    #[error("driver {driver} does not support image type {image_type:?}")]
    UnsupportedImageType { driver: String, image_type: String },

    /// A credential could not be loaded.
    #[error("credential error in {}: {message}", path.display())]
    Credentials { path: PathBuf, message: String },

    /// Parameter file could not be decoded or a value is not allowed.
    #[error("invalid parameters: {message}")]
    Parameters { message: String },

    /// Driver reported a failed run.
    #[error("driver {driver} failed: {message}")]
    Driver { driver: String, message: String },

    /// The install action failed; the claim was stored regardless.
    #[error("Install step failed: {source}")]
    InstallStepFailed {
        #[source]
        source: Box<InstallError>,
    },

    /// No claim is stored under this installation name.
    #[error("no claim found for installation {installation:?}")]
    ClaimNotFound { installation: String },

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
}

impl InstallError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Registry(e) => e.exit_code(),

            Self::NoDecoder { .. }
            | Self::InvalidInstallationName { .. }
            | Self::MissingImageVersion { .. }
            | Self::UnknownDriver { .. }
            | Self::Credentials { .. }
            | Self::Parameters { .. }
            | Self::ClaimNotFound { .. } => 1,

            Self::UnsupportedImageType { .. }
            | Self::Driver { .. }
            | Self::InstallStepFailed { .. } => 4,

            Self::Io { .. } | Self::Serialization { .. } => 5,
        }
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for InstallError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type for installation operations.
pub type InstallResult<T> = Result<T, InstallError>;
