//! Patch command

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use crossterm::style::Stylize;
use glix_core::Reporter;
use glix_core::catalog::Crawler;
use glix_core::config::Settings;
use glix_core::libc::libc_version_of;
use glix_core::relinker::Retargeter;
use glix_core::store::VersionRegistry;
use glix_schema::VersionId;

use super::install::{InstallOptions, install_versions};
use crate::PatchCommands;
use crate::ui::{Output, table};

pub async fn patch(settings: &Settings, command: &PatchCommands) -> Result<()> {
    let registry = super::open_registry(settings)?;
    let output = Arc::new(Output::new());

    match command {
        PatchCommands::Choose { elf, no_backup } => {
            let Some(version) = choose(&registry, &output)? else {
                return Ok(());
            };
            apply(settings, &registry, elf, &version, !no_backup, &output)
        }
        PatchCommands::Version {
            elf,
            version,
            no_backup,
        } => {
            let version = super::parse_version(version)?;
            apply(settings, &registry, elf, &version, !no_backup, &output)
        }
        PatchCommands::Auto {
            elf,
            libc,
            no_backup,
            packages,
        } => {
            let version = ensure_matching(settings, &registry, elf, libc, packages, &output).await?;
            apply(settings, &registry, elf, &version, !no_backup, &output)
        }
    }
}

fn tool_timeout(settings: &Settings) -> Duration {
    Duration::from_secs(settings.patch.tool_timeout_secs)
}

/// Prompt for one of the installed versions.
fn choose(registry: &VersionRegistry, output: &Output) -> Result<Option<VersionId>> {
    let installed = registry.list()?;
    if installed.is_empty() {
        output.error("No glibc versions installed.");
        return Ok(None);
    }

    output.block(&table::choices(&installed).to_string());
    print!("  Select a version (1-{}): ", installed.len());
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    match input.trim().parse::<usize>() {
        Ok(n) if (1..=installed.len()).contains(&n) => {
            let version = installed[n - 1].version.clone();
            output.info(&format!("Selected {}", version.as_str().cyan()));
            Ok(Some(version))
        }
        _ => {
            output.error("Invalid selection");
            Ok(None)
        }
    }
}

/// Identify the build `libc` came from and install it if it is missing.
async fn ensure_matching(
    settings: &Settings,
    registry: &VersionRegistry,
    elf: &Path,
    libc: &Path,
    packages: &[String],
    output: &Arc<Output>,
) -> Result<VersionId> {
    let version = libc_version_of(libc)
        .with_context(|| format!("Failed to read {}", libc.display()))?
        .with_context(|| format!("No Ubuntu GLIBC banner in {}", libc.display()))?;

    if registry.lookup(&version)?.is_some() {
        output.info(&format!("Found installed glibc {version}"));
        return Ok(version);
    }

    let arch = Retargeter::new(registry, tool_timeout(settings))
        .architecture(elf)
        .with_context(|| format!("Failed to determine the architecture of {}", elf.display()))?;
    output.warning(&format!(
        "glibc {version} is not installed, fetching it for {arch}"
    ));

    let crawler = Crawler::from_settings(&settings.catalog)?;
    let options = InstallOptions {
        arch,
        packages,
        force: true,
        save: None,
    };
    let report = install_versions(
        settings,
        registry,
        &crawler,
        vec![version.clone()],
        options,
        output,
    )
    .await?;

    if let Some((_, reason)) = report.failures.first() {
        bail!("Failed to install glibc {version}: {reason}");
    }
    Ok(version)
}

fn backup_path(elf: &Path) -> PathBuf {
    let mut name = OsString::from(elf.as_os_str());
    name.push(".bak");
    PathBuf::from(name)
}

/// Retarget `elf`, restoring the backup if the edit fails.
fn apply(
    settings: &Settings,
    registry: &VersionRegistry,
    elf: &Path,
    version: &VersionId,
    backup: bool,
    output: &Output,
) -> Result<()> {
    if !elf.is_file() {
        bail!("{} is not a file", elf.display());
    }

    let retargeter = Retargeter::new(registry, tool_timeout(settings));
    retargeter
        .check_tools()
        .context("Cannot retarget binaries")?;

    let saved = if backup {
        let path = backup_path(elf);
        std::fs::copy(elf, &path)
            .with_context(|| format!("Failed to create backup {}", path.display()))?;
        output.info(&format!("Created backup {}", path.display()));
        Some(path)
    } else {
        None
    };

    let result = retargeter.retarget(elf, version);
    if result.success {
        output.success(&format!(
            "Patched {} to use glibc {}",
            elf.display(),
            version.as_str().cyan()
        ));
        return Ok(());
    }

    if let Some(path) = saved {
        std::fs::rename(&path, elf)
            .with_context(|| format!("Failed to restore {}", elf.display()))?;
        output.warning("Restored from backup");
    }
    bail!(
        "Patch failed: {}",
        result.error.unwrap_or_else(|| "unknown error".to_string())
    )
}
