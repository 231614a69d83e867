use hoist_registry::HoistConfig;
use tracing::debug;

use super::super::args::*;
use crate::exit_codes::SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let mut config = HoistConfig::from_env();
    if let Some(home) = cli.home {
        config = config.with_home(home);
    }
    debug!(home = %config.home.display(), repository = %config.default_repository, "config");

    match cli.cmd {
        Command::Install(args) => super::install::run(args, config).await,
        Command::Repo(args) => match args.cmd {
            RepoSub::Generate(a) => super::repo::cmd_generate(a, &config).await,
            RepoSub::Merge(a) => super::repo::cmd_merge(a).await,
            RepoSub::Search(a) => super::repo::cmd_search(a).await,
        },
        Command::Store(args) => match args.cmd {
            StoreSub::Add(a) => super::store::cmd_add(a, &config).await,
            StoreSub::Verify(a) => super::store::cmd_verify(a, &config).await,
        },
        Command::Key(args) => match args.cmd {
            KeySub::Generate(a) => super::key::cmd_generate(a, &config).await,
            KeySub::List => super::key::cmd_list(&config),
        },
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}
