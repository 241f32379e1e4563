//! Command handlers

pub mod completions;
pub mod config;
pub mod install;
pub mod list;
pub mod patch;
pub mod remove;
pub mod search;
pub mod versions;

use std::path::Path;

use anyhow::{Context, Result};
use glix_core::config::Settings;
use glix_core::store::VersionRegistry;
use glix_schema::VersionId;

/// Settings from `path`, or from the default location.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(p) => Settings::load_from(p),
        None => Settings::load(),
    };
    settings.context("Failed to load settings")
}

pub fn open_registry(settings: &Settings) -> Result<VersionRegistry> {
    let path = settings.database();
    VersionRegistry::open_at(&path)
        .with_context(|| format!("Failed to open registry at {}", path.display()))
}

pub fn parse_version(raw: &str) -> Result<VersionId> {
    VersionId::parse(raw).with_context(|| format!("Invalid version '{raw}'"))
}

/// Keep versions whose `MAJOR.MINOR` equals `series`.
pub fn in_series(versions: Vec<VersionId>, series: Option<&str>) -> Vec<VersionId> {
    match series {
        Some(s) => versions.into_iter().filter(|v| v.series() == s).collect(),
        None => versions,
    }
}
