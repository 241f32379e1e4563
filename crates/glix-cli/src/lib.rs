//! glix - historical glibc builds for ELF binaries
//!
//! Fetches Ubuntu glibc builds from Launchpad, keeps a registry of installed
//! versions, and retargets ELF executables to run against one of them.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.glix/
//! ├── config.toml # Optional settings
//! ├── downloads/  # Fetched .deb archives
//! ├── libs/       # One extraction tree per archive
//! └── glix.db     # SQLite registry
//! ```
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]

pub mod cmd;
pub mod ui;

use clap::{Parser, Subcommand};
use glix_schema::Arch;
use std::path::PathBuf;

/// Package names accepted by `-p/--package`.
pub const PACKAGE_CHOICES: [&str; 3] = glix_core::install::DEFAULT_PACKAGES;

#[derive(Debug, Parser)]
#[command(name = "glix")]
#[command(author, version, about = "glix - install glibc builds and retarget ELF binaries")]
pub struct Cli {
    /// Settings file (defaults to ~/.glix/config.toml)
    #[arg(long, global = true, env = "GLIX_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download and register glibc builds
    Install {
        /// Versions to install, e.g. 2.31-0ubuntu9.16
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        versions: Vec<String>,
        /// Install the newest builds of every series
        #[arg(long, short = 'a')]
        all: bool,
        /// Builds kept per MAJOR.MINOR series with --all
        #[arg(long, default_value_t = 3)]
        nums: usize,
        /// Target architecture
        #[arg(long, default_value = "amd64")]
        arch: Arch,
        /// Packages to fetch (repeatable)
        #[arg(short, long = "package", default_value = "libc6", value_parser = PACKAGE_CHOICES)]
        packages: Vec<String>,
        /// Reinstall versions that are already registered
        #[arg(long, short = 'f')]
        force: bool,
        /// Also write the catalog records to this JSON file
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// List installed versions
    List,
    /// Forget installed versions
    Remove {
        /// Versions to remove
        #[arg(required = true)]
        versions: Vec<String>,
    },
    /// Retarget an ELF binary at an installed glibc
    Patch {
        #[command(subcommand)]
        command: PatchCommands,
    },
    /// List versions published in the catalog
    Versions {
        /// Only show one series, e.g. 2.31
        #[arg(long)]
        series: Option<String>,
    },
    /// Show which packages each published version provides
    Search {
        /// Only show one series, e.g. 2.31
        #[arg(long)]
        series: Option<String>,
        /// Target architecture
        #[arg(long, default_value = "amd64")]
        arch: Arch,
        /// Packages to look for (repeatable)
        #[arg(short, long = "package", default_values_t = PACKAGE_CHOICES.map(String::from), value_parser = PACKAGE_CHOICES)]
        packages: Vec<String>,
        /// Write the records to this JSON file
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Inspect settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum PatchCommands {
    /// Pick an installed version interactively
    Choose {
        /// ELF file to patch
        elf: PathBuf,
        /// Skip the <elf>.bak copy that is restored on failure
        #[arg(long)]
        no_backup: bool,
    },
    /// Match the glibc a given libc.so.6 was built from, installing it if needed
    Auto {
        /// ELF file to patch
        elf: PathBuf,
        /// The libc.so.6 the binary was shipped with
        libc: PathBuf,
        /// Skip the <elf>.bak copy that is restored on failure
        #[arg(long)]
        no_backup: bool,
        /// Packages to fetch when installing (repeatable)
        #[arg(short, long = "package", default_value = "libc6", value_parser = PACKAGE_CHOICES)]
        packages: Vec<String>,
    },
    /// Use a specific installed version
    Version {
        /// ELF file to patch
        elf: PathBuf,
        /// Installed version
        version: String,
        /// Skip the <elf>.bak copy that is restored on failure
        #[arg(long)]
        no_backup: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective settings as TOML
    Show,
    /// Print the settings file location
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_install_defaults() {
        let cli = Cli::parse_from(["glix", "install", "2.31-0ubuntu9"]);
        match cli.command {
            Commands::Install {
                versions,
                arch,
                packages,
                force,
                ..
            } => {
                assert_eq!(versions, ["2.31-0ubuntu9"]);
                assert_eq!(arch, Arch::Amd64);
                assert_eq!(packages, ["libc6"]);
                assert!(!force);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_install_requires_version_or_all() {
        assert!(Cli::try_parse_from(["glix", "install"]).is_err());
        assert!(Cli::try_parse_from(["glix", "install", "--all", "2.31-0ubuntu9"]).is_err());
        assert!(Cli::try_parse_from(["glix", "install", "-p", "bogus", "2.31-0ubuntu9"]).is_err());
    }

    #[test]
    fn test_patch_backup_flags() {
        let cli = Cli::parse_from(["glix", "patch", "version", "./chall", "2.31-0ubuntu9", "--no-backup"]);
        let Commands::Patch {
            command: PatchCommands::Version { no_backup, .. },
        } = cli.command
        else {
            panic!("expected patch version");
        };
        assert!(no_backup);
    }
}
