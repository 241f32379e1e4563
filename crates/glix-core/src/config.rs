//! User settings, read from `~/.glix/config.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine:
//!
//! ```toml
//! [download]
//! max_workers = 8
//! timeout_secs = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub catalog: CatalogSettings,
    pub download: DownloadSettings,
    pub extract: ExtractSettings,
    pub patch: PatchSettings,
    pub paths: PathSettings,
}

/// Where and how hard to crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub base_url: String,
    pub distro: String,
    pub source_package: String,
    /// Concurrent publishing-history page fetches.
    pub page_workers: usize,
    /// Concurrent per-version detail fetches.
    pub version_workers: usize,
    pub timeout_secs: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            base_url: "https://launchpad.net/".to_string(),
            distro: "ubuntu".to_string(),
            source_package: "glibc".to_string(),
            page_workers: 10,
            version_workers: 8,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub max_workers: usize,
    /// Write buffer size in bytes.
    pub chunk_size: usize,
    /// Total attempts per file, including the first.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_workers: 5,
            chunk_size: 8192,
            max_retries: 3,
            retry_delay_ms: 1000,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractSettings {
    pub max_workers: usize,
    pub tool_timeout_secs: u64,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            max_workers: 5,
            tool_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchSettings {
    pub tool_timeout_secs: u64,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// Overrides for the directories under `~/.glix`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub download_dir: Option<PathBuf>,
    pub extract_dir: Option<PathBuf>,
    pub database: Option<PathBuf>,
}

impl Settings {
    /// Load `~/.glix/config.toml`, falling back to defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&crate::config_path())
    }

    /// Load settings from a specific file (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn download_dir(&self) -> PathBuf {
        self.paths
            .download_dir
            .clone()
            .unwrap_or_else(crate::download_path)
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.paths
            .extract_dir
            .clone()
            .unwrap_or_else(crate::extract_path)
    }

    pub fn database(&self) -> PathBuf {
        self.paths.database.clone().unwrap_or_else(crate::db_path)
    }
}

impl DownloadSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
