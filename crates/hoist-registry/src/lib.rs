//! Bundle repositories for hoist.
//!
//! This crate covers everything between a bundle reference typed by a user
//! and a manifest on local disk:
//!
//! - Versioned index catalog with semver constraint lookup
//! - Static repository generation from a directory of manifests
//! - Reference parsing and resolution with mirror fallback
//! - Content-addressed storage, optionally clear-signed with ed25519
//! - Signing keyring and trust store
//!
//! # Quick Start
//!
//! ```no_run
//! use hoist_registry::{HoistConfig, Resolver};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = HoistConfig::from_env();
//! let resolver = Resolver::from_config(&config)?;
//!
//! let manifest = resolver.resolve("hub.example.org/helloworld:0.1.0").await?;
//! println!("cached at {}", manifest.display());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `HOIST_HOME` | Home directory (default: `~/.hoist`) |
//! | `HOIST_DEFAULT_REPOSITORY` | Repository domain for bare references (default: `hub.cnlabs.io`) |
//! | `HOIST_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `HOIST_VERIFY_DIGEST` | Verify mirror downloads against the index digest (default: true) |

pub mod bundle;
pub mod config;
pub mod digest;
pub mod error;
pub mod generator;
pub mod index;
pub mod reference;
pub mod resolver;
pub mod signature;
pub mod store;
pub mod trust;

// Re-export main types
pub use bundle::{
    Bundle, CredentialLocation, Image, InvocationImage, LocationRef, Maintainer,
    ParameterDefinition, ParameterMetadata,
};
pub use config::{Home, HoistConfig, DEFAULT_REPOSITORY};
pub use digest::{digest_bytes, digest_file, digest_reader, is_digest};
pub use error::{RegistryError, RegistryResult};
pub use generator::{generate_from_directory, merge_index_files, Generator};
pub use index::{parse_version, BundleEntry, IndexFile, API_VERSION_V1, INDEX_FILE_NAME};
pub use reference::{BundleReference, BundleSource, DEFAULT_PROTOCOL, DEFAULT_TAG};
pub use resolver::{Resolver, ResolverConfig};
pub use signature::{
    compute_key_id, is_clearsigned, verify_clearsigned, KeyRing, NamedKey, Signer,
    VerifiedMessage, PAYLOAD_TYPE_BUNDLE_V1,
};
pub use store::ContentStore;
pub use trust::{TrustStore, TrustedKey};
