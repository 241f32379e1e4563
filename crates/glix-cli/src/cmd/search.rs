//! Search command

use std::path::Path;

use anyhow::{Context, Result};
use glix_core::Reporter;
use glix_core::catalog::{self, Crawler};
use glix_core::config::Settings;
use glix_schema::Arch;

use crate::ui::{Output, table};

/// Crawl the catalog and show which requested packages each version provides.
pub async fn search(
    settings: &Settings,
    series: Option<&str>,
    arch: Arch,
    packages: &[String],
    save: Option<&Path>,
) -> Result<()> {
    let output = Output::new();
    let crawler = Crawler::from_settings(&settings.catalog)?;

    output.section("Discovering versions");
    let versions = crawler
        .discover_versions()
        .await
        .context("Failed to enumerate published versions")?;
    let versions = super::in_series(versions, series);
    if versions.is_empty() {
        output.info("No matching versions published.");
        return Ok(());
    }

    output.section(&format!("Fetching {} build records", versions.len()));
    let labels = [arch.build_label().to_string()];
    let results = crawler.fetch_versions(&versions, &labels, packages).await;

    output.block(&table::availability(&results, arch, packages).to_string());
    output.summary("packages found", catalog::package_counts(&results));

    if let Some(path) = save {
        catalog::save_json(&results, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        output.info(&format!("Saved records to {}", path.display()));
    }
    Ok(())
}
