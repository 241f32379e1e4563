//! Archive expansion through external utilities.
//!
//! `.deb` packages are unpacked with `dpkg-deb -x`; the source tarball that
//! `glibc-source` ships is expanded a second time with `tar`. Both sit behind
//! [`ArchiveExpander`] so tests can substitute an in-process fake.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use glix_schema::ExtractionResult;

use crate::tool::{self, ToolError};
use crate::{NullReporter, Reporter};

/// Expands one archive into a directory.
pub trait ArchiveExpander: Send + Sync {
    /// Utility name, for diagnostics.
    fn name(&self) -> &str;

    /// Expand `archive` into `dest`, which already exists.
    ///
    /// # Errors
    ///
    /// Returns the utility's failure, including its stderr.
    fn expand(&self, archive: &Path, dest: &Path) -> Result<(), ToolError>;

    /// Confirm the utility is installed.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Missing`] when it is not on `PATH`.
    fn check(&self) -> Result<(), ToolError> {
        Ok(())
    }
}

/// `dpkg-deb -x <archive> <dest>`
#[derive(Debug, Clone)]
pub struct DpkgDeb {
    timeout: Duration,
}

impl DpkgDeb {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ArchiveExpander for DpkgDeb {
    fn name(&self) -> &str {
        "dpkg-deb"
    }

    fn check(&self) -> Result<(), ToolError> {
        tool::ensure_available("dpkg-deb")
    }

    fn expand(&self, archive: &Path, dest: &Path) -> Result<(), ToolError> {
        tool::run(
            "dpkg-deb",
            [OsStr::new("-x"), archive.as_os_str(), dest.as_os_str()],
            self.timeout,
        )
        .map(|_| ())
    }
}

/// `tar -xf <archive> -C <dest>`; compression is auto-detected.
#[derive(Debug, Clone)]
pub struct TarExpander {
    timeout: Duration,
}

impl TarExpander {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ArchiveExpander for TarExpander {
    fn name(&self) -> &str {
        "tar"
    }

    fn check(&self) -> Result<(), ToolError> {
        tool::ensure_available("tar")
    }

    fn expand(&self, archive: &Path, dest: &Path) -> Result<(), ToolError> {
        tool::run(
            "tar",
            [
                OsStr::new("-xf"),
                archive.as_os_str(),
                OsStr::new("-C"),
                dest.as_os_str(),
            ],
            self.timeout,
        )
        .map(|_| ())
    }
}

/// Unpacks archives into `root/<file stem>`.
#[derive(Clone)]
pub struct PackageExtractor {
    root: PathBuf,
    expander: Arc<dyn ArchiveExpander>,
    max_workers: usize,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for PackageExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageExtractor")
            .field("root", &self.root)
            .field("expander", &self.expander.name())
            .field("max_workers", &self.max_workers)
            .finish_non_exhaustive()
    }
}

impl PackageExtractor {
    pub fn new(root: PathBuf, expander: Arc<dyn ArchiveExpander>, max_workers: usize) -> Self {
        Self {
            root,
            expander,
            max_workers: max_workers.max(1),
            reporter: Arc::new(NullReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fail early if the expansion utility is not installed.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Missing`] naming the utility.
    pub fn check(&self) -> Result<(), ToolError> {
        self.expander.check()
    }

    /// Directory an archive expands into.
    pub fn target_for(&self, archive: &Path) -> PathBuf {
        let stem = archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.root.join(stem)
    }

    /// Expand a single archive. Blocks on the external utility.
    ///
    /// The target directory is left as-is on failure.
    pub fn extract_one(&self, archive: &Path) -> ExtractionResult {
        let extract_path = self.target_for(archive);
        let package_name = extract_path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let total_bytes = std::fs::metadata(archive).ok().map(|m| m.len());

        self.reporter.extracting(&package_name);

        let outcome = std::fs::create_dir_all(&extract_path)
            .map_err(|source| ToolError::Io {
                tool: self.expander.name().to_string(),
                source,
            })
            .and_then(|()| self.expander.expand(archive, &extract_path));

        match outcome {
            Ok(()) => {
                tracing::debug!("extracted {} to {}", archive.display(), extract_path.display());
                self.reporter.done(&package_name, "extracted");
                ExtractionResult {
                    success: true,
                    package_name,
                    extract_path,
                    error: None,
                    total_bytes,
                }
            }
            Err(e) => {
                let reason = e.diagnostic();
                tracing::warn!("extracting {} failed: {reason}", archive.display());
                self.reporter.failed(&package_name, &reason);
                ExtractionResult {
                    success: false,
                    package_name,
                    extract_path,
                    error: Some(reason),
                    total_bytes,
                }
            }
        }
    }

    /// Expand every archive on the blocking pool, at most `max_workers` at a
    /// time. Results follow input order.
    pub async fn extract(&self, archives: &[PathBuf]) -> Vec<ExtractionResult> {
        stream::iter(archives.iter().cloned())
            .map(|archive| {
                let this = self.clone();
                async move {
                    let fallback = this.target_for(&archive);
                    tokio::task::spawn_blocking(move || this.extract_one(&archive))
                        .await
                        .unwrap_or_else(|e| ExtractionResult {
                            success: false,
                            package_name: fallback
                                .file_name()
                                .map(|s| s.to_string_lossy().into_owned())
                                .unwrap_or_default(),
                            extract_path: fallback,
                            error: Some(format!("extraction task failed: {e}")),
                            total_bytes: None,
                        })
                }
            })
            .buffered(self.max_workers)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Copies the archive into the destination, or fails on names containing "bad".
    struct FakeExpander;

    impl ArchiveExpander for FakeExpander {
        fn name(&self) -> &str {
            "fake"
        }

        fn expand(&self, archive: &Path, dest: &Path) -> Result<(), ToolError> {
            let name = archive.file_name().unwrap().to_string_lossy();
            std::fs::write(dest.join("partial"), b"x").unwrap();
            if name.contains("bad") {
                return Err(ToolError::Failed {
                    tool: "fake".into(),
                    status: "2".into(),
                    stderr: "dpkg-deb: error: not a debian format archive\n".into(),
                });
            }
            std::fs::copy(archive, dest.join("payload")).unwrap();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_extract_batch_reports_each_archive() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("libc6_2.31-0ubuntu9_amd64.deb");
        let bad = dir.path().join("bad_1_amd64.deb");
        std::fs::write(&good, b"0123456789").unwrap();
        std::fs::write(&bad, b"junk").unwrap();

        let extractor =
            PackageExtractor::new(dir.path().join("libs"), Arc::new(FakeExpander), 2);
        let results = extractor.extract(&[good, bad]).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert_eq!(results[0].package_name, "libc6_2.31-0ubuntu9_amd64");
        assert_eq!(results[0].total_bytes, Some(10));
        assert!(results[0].extract_path.join("payload").exists());

        assert!(!results[1].success);
        assert_eq!(
            results[1].error.as_deref(),
            Some("dpkg-deb: error: not a debian format archive")
        );
        // No rollback of partial output.
        assert!(results[1].extract_path.join("partial").exists());
    }

    #[test]
    fn test_missing_archive_fails_without_panicking() {
        let dir = tempdir().unwrap();
        let extractor = PackageExtractor::new(
            dir.path().to_path_buf(),
            Arc::new(TarExpander::new(Duration::from_secs(5))),
            1,
        );
        let result = extractor.extract_one(&dir.path().join("nope.tar"));
        assert!(!result.success);
        assert!(result.error.is_some());
        assert_eq!(result.total_bytes, None);
    }
}
