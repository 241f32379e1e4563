//! Shared types for glix.
//!
//! Everything here is pure data: the version grammar and its numeric
//! ordering, architecture names, and the records passed between the
//! catalog, fetcher, extractor and registry.

pub mod arch;
pub mod types;
pub mod version;

// Re-exports
pub use arch::*;
pub use types::*;
pub use version::{VersionId, VersionKey, VersionParseError, select_latest, sort_versions};
