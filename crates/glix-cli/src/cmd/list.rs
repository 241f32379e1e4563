use anyhow::Result;
use glix_core::Reporter;

use crate::ui::{Output, table};

/// List installed versions
pub fn list(settings: &glix_core::config::Settings) -> Result<()> {
    let registry = super::open_registry(settings)?;
    let records = registry.list()?;
    let output = Output::new();

    if records.is_empty() {
        output.info("No glibc versions installed.");
        output.info("Run 'glix install <version>' to get started.");
        return Ok(());
    }

    output.block(&table::installed(&records).to_string());
    output.info(&format!("{} installed", records.len()));
    Ok(())
}
