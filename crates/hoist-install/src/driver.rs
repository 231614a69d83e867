//! Drivers run invocation images.
//!
//! The orchestrator only sees the [`Driver`] trait. Drivers are looked up by
//! name in a [`DriverRegistry`]; adding one means registering a constructor.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::claim::{Action, Claim};
use crate::credentials::CredentialSet;
use crate::error::{InstallError, InstallResult};
use crate::parameters::Parameters;

/// Runs an invocation image for a claim.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Registry name, e.g. `debug`.
    fn name(&self) -> &str;

    /// Whether this driver can run images of `image_type`.
    fn handles(&self, image_type: &str) -> bool;

    /// Perform the claim's current action. Returns once the image has exited.
    async fn run(&self, claim: &Claim, credentials: &CredentialSet) -> InstallResult<()>;
}

/// What a driver is asked to do, as handed to the invocation image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub installation: String,
    pub action: Action,
    pub revision: String,
    pub image: String,
    pub image_type: String,
    pub parameters: Parameters,
    /// Credential names only.
    pub credentials: Vec<String>,
}

impl Operation {
    pub fn new(claim: &Claim, credentials: &CredentialSet) -> Self {
        Self {
            installation: claim.installation.clone(),
            action: claim.result.action,
            revision: claim.revision.clone(),
            image: claim.bundle.clone(),
            image_type: claim.image_type.clone(),
            parameters: claim.parameters.clone(),
            credentials: credentials.names().into_iter().map(str::to_string).collect(),
        }
    }
}

/// Logs the operation it would send and succeeds.
#[derive(Debug, Clone, Default)]
pub struct DebugDriver;

impl DebugDriver {
    pub const NAME: &'static str = "debug";
}

#[async_trait]
impl Driver for DebugDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handles(&self, image_type: &str) -> bool {
        matches!(image_type, "docker" | "oci" | "qcow")
    }

    async fn run(&self, claim: &Claim, credentials: &CredentialSet) -> InstallResult<()> {
        if !self.handles(&claim.image_type) {
            return Err(InstallError::UnsupportedImageType {
                driver: self.name().to_string(),
                image_type: claim.image_type.clone(),
            });
        }

        let operation = Operation::new(claim, credentials);
        let rendered = serde_json::to_string_pretty(&operation)?;
        info!(
            driver = self.name(),
            installation = %operation.installation,
            action = %operation.action,
            "would send operation:\n{rendered}"
        );
        Ok(())
    }
}

type DriverCtor = Box<dyn Fn() -> Box<dyn Driver> + Send + Sync>;

/// Driver constructors by name.
#[derive(Default)]
pub struct DriverRegistry {
    ctors: BTreeMap<String, DriverCtor>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the drivers that ship with hoist.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DebugDriver::NAME, || Box::new(DebugDriver));
        registry
    }

    /// Register a constructor, replacing any previous one of that name.
    pub fn register<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn() -> Box<dyn Driver> + Send + Sync + 'static,
    {
        self.ctors.insert(name.into(), Box::new(ctor));
    }

    /// Construct the named driver.
    pub fn lookup(&self, name: &str) -> InstallResult<Box<dyn Driver>> {
        self.ctors
            .get(name)
            .map(|ctor| ctor())
            .ok_or_else(|| InstallError::UnknownDriver {
                name: name.to_string(),
                available: self.names().into_iter().map(str::to_string).collect(),
            })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.ctors.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}
