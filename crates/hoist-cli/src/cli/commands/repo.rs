use anyhow::Context;
use hoist_registry::{merge_index_files, Generator, HoistConfig, IndexFile, KeyRing};

use super::super::args::{RepoGenerateArgs, RepoMergeArgs, RepoSearchArgs};
use crate::exit_codes::SUCCESS;

pub async fn cmd_generate(args: RepoGenerateArgs, config: &HoistConfig) -> anyhow::Result<i32> {
    let mut generator = Generator::new(&args.dir).with_base_url(args.url);
    if args.advertise_keys {
        let ring = KeyRing::load(&config.home_dir().secret_keyring())?;
        if ring.is_empty() {
            anyhow::bail!("--advertise-keys given but the secret keyring has no keys");
        }
        generator = generator.with_public_keys(ring.public_keys());
    }

    let index = generator
        .generate()
        .await
        .with_context(|| format!("failed to index {}", args.dir.display()))?;
    println!(
        "indexed {} bundle(s) under {}",
        index.len(),
        args.dir.display()
    );
    Ok(SUCCESS)
}

pub async fn cmd_merge(args: RepoMergeArgs) -> anyhow::Result<i32> {
    let merged = merge_index_files(&args.target, &args.sources).await?;
    println!(
        "{}: {} bundle(s)",
        args.target.display(),
        merged.len()
    );
    Ok(SUCCESS)
}

pub async fn cmd_search(args: RepoSearchArgs) -> anyhow::Result<i32> {
    let index = IndexFile::load_file(&args.index).await?;
    let names = match &args.term {
        Some(term) => index.search(term),
        None => index.names(),
    };
    for name in names {
        // Entries are sorted newest first.
        let latest = index
            .entries
            .get(name)
            .and_then(|versions| versions.first())
            .map(|entry| entry.version.as_str())
            .unwrap_or("-");
        println!("{name}\t{latest}");
    }
    Ok(SUCCESS)
}
