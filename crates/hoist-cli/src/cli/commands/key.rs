use anyhow::Context;
use hoist_registry::{HoistConfig, KeyRing, TrustStore};

use super::super::args::KeyGenerateArgs;
use crate::exit_codes::SUCCESS;

/// Add a signing key to the secret ring and trust it in the public ring.
pub async fn cmd_generate(args: KeyGenerateArgs, config: &HoistConfig) -> anyhow::Result<i32> {
    let home = config.home_dir();
    home.ensure().await?;

    let mut ring = KeyRing::load(&home.secret_keyring())?;
    let key = ring.generate(&args.name)?.clone();
    ring.save(&home.secret_keyring())
        .context("failed to save secret keyring")?;

    let mut trust = TrustStore::load(&home.public_keyring())?;
    trust.add_pinned_key(key.key_id(), &key.public_key_b64()?)?;
    trust
        .save(&home.public_keyring())
        .context("failed to save public keyring")?;

    println!("{} {}", key.key_id(), key.name());
    Ok(SUCCESS)
}

pub fn cmd_list(config: &HoistConfig) -> anyhow::Result<i32> {
    let home = config.home_dir();
    let ring = KeyRing::load(&home.secret_keyring())?;
    let trust = TrustStore::load(&home.public_keyring())?;

    for key in ring.keys() {
        println!("secret  {}  {}", key.key_id(), key.name());
    }
    for key_id in trust.list_keys() {
        println!("trusted {}", key_id);
    }
    Ok(SUCCESS)
}
