//! Remove command
use anyhow::Result;
use glix_core::Reporter;
use glix_schema::BatchCounts;

use crate::ui::Output;

/// Drop versions from the registry. Extracted files are left on disk.
pub fn remove(settings: &glix_core::config::Settings, versions: &[String]) -> Result<()> {
    let registry = super::open_registry(settings)?;
    let output = Output::new();
    let mut counts = BatchCounts::default();

    for raw in versions {
        let version = super::parse_version(raw)?;
        let removed = registry.remove(&version)?;
        counts.record(removed);
        if removed {
            output.done(version.as_str(), "removed");
        } else {
            output.failed(version.as_str(), "not installed");
        }
    }

    output.summary("remove", counts);
    Ok(())
}
