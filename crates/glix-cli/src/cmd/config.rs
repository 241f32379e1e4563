//! Config command

use std::path::Path;

use anyhow::{Context, Result};

use crate::ConfigCommands;

pub fn config(command: &ConfigCommands, path: Option<&Path>) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let settings = super::load_settings(path)?;
            let text = toml::to_string_pretty(&settings).context("Failed to render settings")?;
            print!("{text}");
        }
        ConfigCommands::Path => {
            let shown = path.map_or_else(glix_core::config_path, Path::to_path_buf);
            println!("{}", shown.display());
        }
    }
    Ok(())
}
