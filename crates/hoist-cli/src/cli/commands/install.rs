use std::sync::Arc;

use anyhow::Context;
use hoist_install::{DriverRegistry, FileClaimStore, InstallRequest, Installer};
use hoist_registry::{BundleSource, HoistConfig, Resolver};

use super::super::args::InstallArgs;
use crate::exit_codes::SUCCESS;

pub async fn run(args: InstallArgs, mut config: HoistConfig) -> anyhow::Result<i32> {
    if args.no_verify_digest {
        config = config.with_verify_digest(false);
    }
    let source = BundleSource::from_args(args.bundle.as_deref(), args.file.as_deref())?;

    let home = config.home_dir();
    home.ensure()
        .await
        .with_context(|| format!("failed to prepare {}", home.root().display()))?;

    let installer = Installer::new(
        Resolver::from_config(&config)?,
        DriverRegistry::with_builtins(),
        Arc::new(FileClaimStore::new(home.claims())),
    );

    let claim = installer
        .install(InstallRequest {
            installation: args.name,
            source,
            credentials_file: args.credentials,
            parameters_file: args.parameters,
            driver: args.driver,
        })
        .await?;

    println!(
        "{}: {} {} (revision {})",
        claim.installation, claim.result.action, claim.result.status, claim.revision
    );
    Ok(SUCCESS)
}
