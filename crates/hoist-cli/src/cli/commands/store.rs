use hoist_registry::{
    is_clearsigned, verify_clearsigned, Bundle, ContentStore, HoistConfig, KeyRing, TrustStore,
};

use super::super::args::{StoreAddArgs, StoreVerifyArgs};
use crate::exit_codes::SUCCESS;

fn content_store(config: &HoistConfig) -> ContentStore {
    let home = config.home_dir();
    ContentStore::new(home.bundles(), home.secret_keyring())
}

pub async fn cmd_add(args: StoreAddArgs, config: &HoistConfig) -> anyhow::Result<i32> {
    let bundle = Bundle::load(&args.file).await?;
    let digest = content_store(config)
        .store_bundle(&bundle, args.insecure, args.signer.as_deref())
        .await?;
    println!("{digest}");
    Ok(SUCCESS)
}

/// Re-check the digest and, for signed content, the signature.
///
/// Keys in the public ring are trusted, as are the local signing keys.
pub async fn cmd_verify(args: StoreVerifyArgs, config: &HoistConfig) -> anyhow::Result<i32> {
    let data = content_store(config).read(&args.digest).await?;

    if !is_clearsigned(&data) {
        Bundle::from_slice(&data, &args.digest)?;
        println!("{}: digest ok, unsigned", args.digest);
        return Ok(SUCCESS);
    }

    let home = config.home_dir();
    let mut trust = TrustStore::load(&home.public_keyring())?;
    for key in KeyRing::load(&home.secret_keyring())?.keys() {
        trust.add_pinned_key(key.key_id(), &key.public_key_b64()?)?;
    }

    let verified = verify_clearsigned(&data, &trust)?;
    let bundle = Bundle::from_slice(&verified.payload, &args.digest)?;
    println!(
        "{}: {} {} signed by {}",
        args.digest, bundle.name, bundle.version, verified.key_id
    );
    Ok(SUCCESS)
}
