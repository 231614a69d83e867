//! Installing bundles.
//!
//! An install turns a bundle source into a claim: the manifest is located
//! (resolved from a repository or read from disk), a driver runs the
//! invocation image, and the resulting claim is stored whether or not the
//! run succeeded.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hoist_install::{DriverRegistry, FileClaimStore, InstallRequest, Installer};
//! use hoist_registry::{BundleSource, HoistConfig, Resolver};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = HoistConfig::from_env();
//! let installer = Installer::new(
//!     Resolver::from_config(&config)?,
//!     DriverRegistry::with_builtins(),
//!     Arc::new(FileClaimStore::new(config.home_dir().claims())),
//! );
//!
//! let claim = installer
//!     .install(InstallRequest {
//!         installation: "my_release".to_string(),
//!         source: BundleSource::from_args(Some("helloworld:0.1.0"), None)?,
//!         credentials_file: None,
//!         parameters_file: None,
//!         driver: "debug".to_string(),
//!     })
//!     .await?;
//! println!("{} is {}", claim.installation, claim.result.status);
//! # Ok(())
//! # }
//! ```

pub mod claim;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod install;
pub mod parameters;

pub use claim::{Action, Claim, ClaimResult, ClaimStore, FileClaimStore, Status};
pub use credentials::CredentialSet;
pub use driver::{DebugDriver, Driver, DriverRegistry, Operation};
pub use error::{InstallError, InstallResult};
pub use install::{validate_image, InstallRequest, Installer};
pub use parameters::{apply_definitions, load_parameters, Format, Parameters};
