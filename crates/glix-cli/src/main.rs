//! glix - install glibc builds and retarget ELF binaries

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use glix_cli::cmd;
use glix_cli::cmd::install::{InstallOptions, Selection};
use glix_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let settings = || cmd::load_settings(config);

    match cli.command {
        Commands::Install {
            versions,
            all,
            nums,
            arch,
            packages,
            force,
            save,
        } => {
            let selection = if all {
                Selection::Latest(nums)
            } else {
                Selection::Versions(versions)
            };
            let options = InstallOptions {
                arch,
                packages: &packages,
                force,
                save: save.as_deref(),
            };
            cmd::install::install(&settings()?, selection, options).await
        }
        Commands::List => cmd::list::list(&settings()?),
        Commands::Remove { versions } => cmd::remove::remove(&settings()?, &versions),
        Commands::Patch { command } => cmd::patch::patch(&settings()?, &command).await,
        Commands::Versions { series } => {
            cmd::versions::versions(&settings()?, series.as_deref()).await
        }
        Commands::Search {
            series,
            arch,
            packages,
            save,
        } => {
            cmd::search::search(
                &settings()?,
                series.as_deref(),
                arch,
                &packages,
                save.as_deref(),
            )
            .await
        }
        Commands::Config { command } => cmd::config::config(&command, config),
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
    }
}
