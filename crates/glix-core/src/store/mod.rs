//! Installed-version registry.

mod db;
mod migrations;

pub use db::{InstalledVersion, RegistryError, VersionRegistry, find_interpreter};
