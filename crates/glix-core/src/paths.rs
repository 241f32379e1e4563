use dirs::home_dir;
use std::path::PathBuf;

/// Returns the glix home directory, or None if the user's home cannot be resolved.
pub fn try_glix_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("GLIX_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".glix"))
}

/// Returns the canonical glix home directory (`~/.glix`).
///
/// # Panics
///
/// Panics if neither `GLIX_HOME` is set nor the user's home directory can be
/// resolved.
pub fn glix_home() -> PathBuf {
    try_glix_home().expect("Could not determine home directory. Set GLIX_HOME to override.")
}

/// Registry database path: ~/.glix/glix.db
pub fn db_path() -> PathBuf {
    glix_home().join("glix.db")
}

/// Settings file: ~/.glix/config.toml
pub fn config_path() -> PathBuf {
    glix_home().join("config.toml")
}

/// Downloaded archives: ~/.glix/downloads
pub fn download_path() -> PathBuf {
    glix_home().join("downloads")
}

/// Extracted package trees: ~/.glix/libs
pub fn extract_path() -> PathBuf {
    glix_home().join("libs")
}

/// Extract the filename from a URL.
pub fn filename_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.split('/').next_back().unwrap_or("")
}
