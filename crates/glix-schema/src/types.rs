use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::version::VersionId;

/// Error recorded when a build page lists files but not the requested package.
pub const ERR_PACKAGE_NOT_FOUND: &str = "Package not found in build";

/// Error recorded when a build page has no file listing at all.
pub const ERR_NO_FILES: &str = "No files found in build";

/// Download location of one package for one (version, architecture).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PackageInfo {
    /// Absolute download URL, empty when `error` is set.
    pub url: String,

    /// Size in bytes as advertised on the build page (0 if unknown).
    #[serde(default)]
    pub size: u64,

    /// Why the package could not be located.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PackageInfo {
    /// A located package.
    pub fn found(url: impl Into<String>, size: u64) -> Self {
        Self {
            url: url.into(),
            size,
            error: None,
        }
    }

    /// A package that could not be located.
    pub fn missing(error: impl Into<String>) -> Self {
        Self {
            url: String::new(),
            size: 0,
            error: Some(error.into()),
        }
    }

    /// True if the package has a usable URL.
    pub fn is_available(&self) -> bool {
        self.error.is_none() && !self.url.is_empty()
    }
}

/// Packages offered by one architecture-specific build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ArchitectureInfo {
    /// URL of the build page the packages were read from.
    pub build_url: String,

    /// Requested package name to location.
    pub packages: BTreeMap<String, PackageInfo>,
}

/// Everything the catalog knows about one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// The version identifier.
    pub version: VersionId,

    /// URL of the version's detail page.
    pub source_url: String,

    /// Build label (e.g. `amd64`) to build contents.
    pub architectures: BTreeMap<String, ArchitectureInfo>,

    /// Set when the detail page itself could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VersionInfo {
    /// An empty record for `version` with no builds yet.
    pub fn new(version: VersionId, source_url: impl Into<String>) -> Self {
        Self {
            version,
            source_url: source_url.into(),
            architectures: BTreeMap::new(),
            error: None,
        }
    }

    /// Look up one package of one build.
    pub fn package(&self, build_label: &str, package: &str) -> Option<&PackageInfo> {
        self.architectures
            .get(build_label)
            .and_then(|a| a.packages.get(package))
    }
}

/// Outcome of downloading one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResult {
    /// The requested URL.
    pub url: String,

    /// True if the whole body was written to `file_path`.
    pub success: bool,

    /// Where the file was written.
    pub file_path: Option<PathBuf>,

    /// Last error seen, when `success` is false.
    pub error: Option<String>,

    /// Bytes written by the final attempt.
    #[serde(default)]
    pub bytes: u64,
}

/// Outcome of expanding one archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// True if the expansion utility exited cleanly.
    pub success: bool,

    /// Archive file stem, also the extraction directory name.
    pub package_name: String,

    /// Extraction directory; may be partially populated on failure.
    pub extract_path: PathBuf,

    /// Diagnostic text from the expansion utility.
    pub error: Option<String>,

    /// Size of the archive in bytes.
    pub total_bytes: Option<u64>,
}

/// Anything a batch operation returns per item.
pub trait Outcome {
    /// True if this item succeeded.
    fn succeeded(&self) -> bool;
}

impl Outcome for DownloadResult {
    fn succeeded(&self) -> bool {
        self.success
    }
}

impl Outcome for ExtractionResult {
    fn succeeded(&self) -> bool {
        self.success
    }
}

impl Outcome for PackageInfo {
    fn succeeded(&self) -> bool {
        self.is_available()
    }
}

/// Per-item counts for a batch operation.
///
/// `attempted == 0` means there was nothing to do, which callers report
/// differently from `succeeded == 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    /// Items submitted.
    pub attempted: usize,
    /// Items that succeeded.
    pub succeeded: usize,
    /// Items that failed.
    pub failed: usize,
}

impl BatchCounts {
    /// Count a slice of batch results.
    pub fn tally<T: Outcome>(results: &[T]) -> Self {
        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        Self {
            attempted: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        }
    }

    /// Record one more item.
    pub fn record(&mut self, ok: bool) {
        self.attempted += 1;
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// True if nothing was submitted.
    pub fn is_empty(&self) -> bool {
        self.attempted == 0
    }
}

impl std::fmt::Display for BatchCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} attempted, {} succeeded, {} failed",
            self.attempted, self.succeeded, self.failed
        )
    }
}
