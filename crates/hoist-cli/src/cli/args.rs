use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "hoist",
    version,
    about = "Install, publish and sign application bundles"
)]
pub struct Cli {
    /// Hoist home directory
    #[arg(long, global = true, env = "HOIST_HOME")]
    pub home: Option<PathBuf>,

    /// Log debug output (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install a bundle under an installation name
    Install(InstallArgs),
    /// Build and merge bundle repositories
    Repo(RepoArgs),
    /// Content-addressed bundle store
    Store(StoreArgs),
    /// Manage signing keys
    Key(KeyArgs),
    /// Print the hoist version
    Version,
}

#[derive(Args, Debug, Clone)]
#[command(after_help = "Examples:
  hoist install my_release hub.example.org/helloworld:0.1.0
  hoist install dev_bundle -f path/to/bundle.json")]
pub struct InstallArgs {
    /// Name for the installation
    pub name: String,

    /// Bundle reference: [proto://][domain/]path[:tag]
    pub bundle: Option<String>,

    /// Bundle file to install instead of a reference
    #[arg(long, short)]
    pub file: Option<PathBuf>,

    /// Credential set file (YAML or JSON)
    #[arg(long, short)]
    pub credentials: Option<PathBuf>,

    /// Parameter file (.toml or .json)
    #[arg(long, short)]
    pub parameters: Option<PathBuf>,

    /// Driver that runs the invocation image
    #[arg(long, short, default_value = "debug")]
    pub driver: String,

    /// Skip the check of downloaded bundles against the index digest
    #[arg(long)]
    pub no_verify_digest: bool,
}

#[derive(Parser, Debug)]
pub struct RepoArgs {
    #[command(subcommand)]
    pub cmd: RepoSub,
}

#[derive(Subcommand, Debug)]
pub enum RepoSub {
    /// Index a directory of bundle manifests
    Generate(RepoGenerateArgs),
    /// Merge index files into a target index
    Merge(RepoMergeArgs),
    /// Search an index for bundle names
    Search(RepoSearchArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RepoGenerateArgs {
    /// Directory holding the manifests
    pub dir: PathBuf,

    /// URL the directory is served under
    #[arg(long, default_value = "")]
    pub url: String,

    /// Advertise the public keys of the local keyring in the index
    #[arg(long)]
    pub advertise_keys: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RepoMergeArgs {
    /// Index written to (created if missing)
    pub target: PathBuf,

    /// Indexes merged in, in order
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RepoSearchArgs {
    /// Index file
    #[arg(long, default_value = "index.json")]
    pub index: PathBuf,

    /// Substring to match; lists everything when omitted
    pub term: Option<String>,
}

#[derive(Parser, Debug)]
pub struct StoreArgs {
    #[command(subcommand)]
    pub cmd: StoreSub,
}

#[derive(Subcommand, Debug)]
pub enum StoreSub {
    /// Store a bundle manifest and print its digest
    Add(StoreAddArgs),
    /// Check a stored bundle's digest and signature
    Verify(StoreVerifyArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StoreAddArgs {
    /// Bundle manifest
    pub file: PathBuf,

    /// Store without signing
    #[arg(long)]
    pub insecure: bool,

    /// Signing key name or key id (default: first key)
    #[arg(long, short)]
    pub signer: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct StoreVerifyArgs {
    /// Digest printed by `hoist store add`
    pub digest: String,
}

#[derive(Parser, Debug)]
pub struct KeyArgs {
    #[command(subcommand)]
    pub cmd: KeySub,
}

#[derive(Subcommand, Debug)]
pub enum KeySub {
    /// Generate a signing key and trust it
    Generate(KeyGenerateArgs),
    /// List signing and trusted keys
    List,
}

#[derive(Args, Debug, Clone)]
pub struct KeyGenerateArgs {
    /// Key name
    pub name: String,
}
