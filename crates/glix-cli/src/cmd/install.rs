//! Install command

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use glix_core::Reporter;
use glix_core::catalog::{self, Crawler};
use glix_core::config::Settings;
use glix_core::install::{InstallReport, Installer};
use glix_core::store::VersionRegistry;
use glix_schema::{Arch, VersionId, VersionInfo, select_latest};

use crate::ui::{Output, table};

/// How to install a set of versions.
#[derive(Debug, Clone, Copy)]
pub struct InstallOptions<'a> {
    pub arch: Arch,
    pub packages: &'a [String],
    pub force: bool,
    pub save: Option<&'a Path>,
}

/// Which versions to install.
#[derive(Debug, Clone)]
pub enum Selection {
    Versions(Vec<String>),
    /// Newest `n` builds of every series.
    Latest(usize),
}

pub async fn install(
    settings: &Settings,
    selection: Selection,
    options: InstallOptions<'_>,
) -> Result<()> {
    let output = Arc::new(Output::new());
    let crawler = Crawler::from_settings(&settings.catalog)?;

    let targets = match selection {
        Selection::Versions(raw) => raw
            .iter()
            .map(|v| super::parse_version(v))
            .collect::<Result<Vec<_>>>()?,
        Selection::Latest(per_series) => {
            output.section("Discovering versions");
            let found = crawler
                .discover_versions()
                .await
                .context("Failed to enumerate published versions")?;
            select_latest(&found, per_series)
        }
    };

    let registry = super::open_registry(settings)?;
    let report = install_versions(settings, &registry, &crawler, targets, options, &output).await?;

    if report.registrations.is_empty() {
        return Ok(());
    }

    output.block(&table::install_summary(&report).to_string());
    for (version, reason) in &report.failures {
        output.failed(version.as_str(), reason);
    }
    if report.registrations.succeeded == 0 {
        bail!("No versions were installed");
    }
    Ok(())
}

/// Resolve, download, extract and register `targets`.
///
/// Versions already in the registry are skipped unless `options.force`.
pub async fn install_versions(
    settings: &Settings,
    registry: &VersionRegistry,
    crawler: &Crawler,
    targets: Vec<VersionId>,
    options: InstallOptions<'_>,
    output: &Arc<Output>,
) -> Result<InstallReport> {
    let mut pending = Vec::with_capacity(targets.len());
    for version in targets {
        if !options.force && registry.lookup(&version)?.is_some() {
            output.info(&format!(
                "{version} is already installed. Use --force to reinstall."
            ));
            continue;
        }
        pending.push(version);
    }
    if pending.is_empty() {
        return Ok(InstallReport::default());
    }

    output.section(&format!("Resolving {} versions", pending.len()));
    let labels = [options.arch.build_label().to_string()];
    let records = crawler
        .fetch_versions(&pending, &labels, options.packages)
        .await;

    output.block(&table::availability(&records, options.arch, options.packages).to_string());

    if let Some(path) = options.save {
        catalog::save_json(&records, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        output.info(&format!("Saved records to {}", path.display()));
    }

    let reporter: Arc<dyn Reporter> = output.clone();
    let installer = Installer::from_settings(registry, settings, reporter)?;
    let records: Vec<VersionInfo> = records.into_values().collect();

    Ok(installer
        .install(&records, options.arch, options.packages)
        .await?)
}
