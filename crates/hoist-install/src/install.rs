//! The install orchestrator.
//!
//! ```text
//! source → manifest → image check → driver → credentials → claim
//!        → driver.run → claim store (always)
//! ```
//!
//! Once the driver has been started the claim is stored no matter how the
//! run ended.

use std::path::PathBuf;
use std::sync::Arc;

use hoist_registry::{Bundle, BundleSource, InvocationImage, Resolver};
use tracing::{debug, error, info};

use crate::claim::{validate_installation_name, Action, Claim, ClaimStore, Status};
use crate::credentials::CredentialSet;
use crate::driver::DriverRegistry;
use crate::error::{InstallError, InstallResult};
use crate::parameters::{apply_definitions, load_parameters, Format};

/// One install invocation.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// Installation name the claim is stored under.
    pub installation: String,
    pub source: BundleSource,
    pub credentials_file: Option<PathBuf>,
    /// `.toml` or `.json`.
    pub parameters_file: Option<PathBuf>,
    pub driver: String,
}

/// Installs bundles.
pub struct Installer {
    resolver: Resolver,
    drivers: DriverRegistry,
    claims: Arc<dyn ClaimStore>,
}

impl Installer {
    pub fn new(resolver: Resolver, drivers: DriverRegistry, claims: Arc<dyn ClaimStore>) -> Self {
        Self {
            resolver,
            drivers,
            claims,
        }
    }

    pub fn claims(&self) -> &Arc<dyn ClaimStore> {
        &self.claims
    }

    /// Install a bundle and return the stored claim.
    ///
    /// A failed driver run yields `InstallStepFailed` after the claim has
    /// been stored. If storing fails as well, the storage error is returned.
    pub async fn install(&self, request: InstallRequest) -> InstallResult<Claim> {
        // Input checks that need no I/O.
        validate_installation_name(&request.installation)?;
        if let Some(path) = &request.parameters_file {
            Format::from_path(path)?;
        }

        let manifest = self.resolver.locate(&request.source).await?;
        let bundle = Bundle::load(&manifest).await?;
        debug!(
            name = %bundle.name,
            version = %bundle.version,
            manifest = %manifest.display(),
            "loaded bundle"
        );

        validate_image(&bundle.invocation_image)?;
        let driver = self.drivers.lookup(&request.driver)?;
        let credentials = CredentialSet::load(request.credentials_file.as_deref()).await?;

        let mut claim = Claim::new(&request.installation)?;
        claim.bundle = bundle.invocation_image.image.clone();
        claim.image_type = bundle.invocation_image.image_type.clone();
        let values = match &request.parameters_file {
            Some(path) => load_parameters(path).await?,
            None => Default::default(),
        };
        claim.parameters = apply_definitions(&bundle, values)?;
        claim.update(Action::Install, Status::Underway, "");

        info!(
            installation = %claim.installation,
            image = %claim.bundle,
            driver = driver.name(),
            "executing install action"
        );
        let outcome = driver.run(&claim, &credentials).await;
        match &outcome {
            Ok(()) => claim.update(Action::Install, Status::Success, ""),
            Err(e) => claim.update(Action::Install, Status::Failure, e.to_string()),
        }

        let stored = self.claims.store(&claim).await;
        match (outcome, stored) {
            (_, Err(store_err)) => {
                error!(
                    installation = %claim.installation,
                    error = %store_err,
                    "failed to store claim"
                );
                Err(store_err)
            }
            (Err(run_err), Ok(())) => Err(InstallError::InstallStepFailed {
                source: Box::new(run_err),
            }),
            (Ok(()), Ok(())) => {
                info!(installation = %claim.installation, revision = %claim.revision, "installed");
                Ok(claim)
            }
        }
    }
}

/// Docker and OCI images must name a version.
pub fn validate_image(image: &InvocationImage) -> InstallResult<()> {
    match image.image_type.as_str() {
        "docker" | "oci" if !image.image.contains(':') => Err(InstallError::MissingImageVersion {
            image: image.image.clone(),
        }),
        _ => Ok(()),
    }
}
