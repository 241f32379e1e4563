//! Versions command

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use glix_core::Reporter;
use glix_core::catalog::Crawler;
use glix_core::config::Settings;

use crate::ui::Output;

/// Print every published version, oldest first.
pub async fn versions(settings: &Settings, series: Option<&str>) -> Result<()> {
    let output = Output::new();
    let crawler = Crawler::from_settings(&settings.catalog)?;

    let found = crawler
        .discover_versions()
        .await
        .context("Failed to enumerate published versions")?;
    let found = super::in_series(found, series);

    if found.is_empty() {
        output.info("No matching versions published.");
        return Ok(());
    }

    for v in &found {
        println!("  {}", v.as_str().cyan());
    }
    output.info(&format!("{} versions", found.len()));
    Ok(())
}
