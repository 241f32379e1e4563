//! Installation pipeline: download, extract, locate payloads, register.
//!
//! A version is installable when its `libc6` package was found for the
//! requested architecture. `libc6-dbg` and `glibc-source` are optional
//! extras; when present their payloads are attached to the record.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glix_schema::{Arch, BatchCounts, VersionId, VersionInfo};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::Settings;
use crate::io::download::{FetchError, Fetcher};
use crate::io::extract::{ArchiveExpander, DpkgDeb, PackageExtractor, TarExpander};
use crate::store::{InstalledVersion, RegistryError, VersionRegistry};
use crate::tool::ToolError;
use crate::Reporter;

pub const LIBC_PACKAGE: &str = "libc6";
pub const DEBUG_PACKAGE: &str = "libc6-dbg";
pub const SOURCE_PACKAGE: &str = "glibc-source";

/// Packages fetched when the caller does not choose.
pub const DEFAULT_PACKAGES: [&str; 3] = [LIBC_PACKAGE, DEBUG_PACKAGE, SOURCE_PACKAGE];

const LIBC_FILE: &str = "libc.so.6";
const SOURCE_DIR: &str = "src";

#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// What an install run did, stage by stage.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub downloads: BatchCounts,
    pub extractions: BatchCounts,
    pub registrations: BatchCounts,
    pub installed: Vec<InstalledVersion>,
    /// Versions that could not be registered, with the reason.
    pub failures: Vec<(VersionId, String)>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.registrations.is_empty()
    }
}

/// Extraction directories for one version, by package name.
#[derive(Debug, Default)]
struct Extracted {
    dirs: HashMap<String, PathBuf>,
    errors: Vec<String>,
}

pub struct Installer<'r> {
    registry: &'r VersionRegistry,
    fetcher: Fetcher,
    extractor: PackageExtractor,
    source_expander: Arc<dyn ArchiveExpander>,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for Installer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("fetcher", &self.fetcher)
            .field("extractor", &self.extractor)
            .field("source_expander", &self.source_expander.name())
            .finish_non_exhaustive()
    }
}

impl<'r> Installer<'r> {
    pub fn new(
        registry: &'r VersionRegistry,
        fetcher: Fetcher,
        extractor: PackageExtractor,
        source_expander: Arc<dyn ArchiveExpander>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            registry,
            fetcher: fetcher.with_reporter(reporter.clone()),
            extractor: extractor.with_reporter(reporter.clone()),
            source_expander,
            reporter,
        }
    }

    /// Installer with the stock `dpkg-deb` and `tar` expanders.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_settings(
        registry: &'r VersionRegistry,
        settings: &Settings,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, InstallError> {
        let timeout = std::time::Duration::from_secs(settings.extract.tool_timeout_secs);
        let fetcher = Fetcher::new(settings.download.clone(), settings.download_dir())?;
        let extractor = PackageExtractor::new(
            settings.extract_dir(),
            Arc::new(DpkgDeb::new(timeout)),
            settings.extract.max_workers,
        );
        Ok(Self::new(
            registry,
            fetcher,
            extractor,
            Arc::new(TarExpander::new(timeout)),
            reporter,
        ))
    }

    /// Install `packages` of every version in `versions` for `arch`.
    ///
    /// Per-version problems land in the report.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Tool`] before anything is downloaded if an
    /// expansion utility the batch needs is not installed.
    pub async fn install(
        &self,
        versions: &[VersionInfo],
        arch: Arch,
        packages: &[String],
    ) -> Result<InstallReport, InstallError> {
        self.extractor.check()?;
        if packages.iter().any(|p| p == SOURCE_PACKAGE) {
            self.source_expander.check()?;
        }

        let mut report = InstallReport::default();
        let label = arch.build_label();

        // url -> (version, package)
        let mut owners: HashMap<String, (VersionId, String)> = HashMap::new();
        let mut items = Vec::new();
        let mut per_version: HashMap<VersionId, Extracted> = HashMap::new();

        for info in versions {
            let slot = per_version.entry(info.version.clone()).or_default();
            if let Some(e) = &info.error {
                slot.errors.push(e.clone());
                continue;
            }
            for pkg in packages {
                match info.package(label, pkg) {
                    Some(p) if p.is_available() => {
                        owners.insert(p.url.clone(), (info.version.clone(), pkg.clone()));
                        items.push((p.url.clone(), p.size));
                    }
                    Some(p) => slot.errors.push(format!(
                        "{pkg}: {}",
                        p.error.as_deref().unwrap_or("unavailable")
                    )),
                    None => slot.errors.push(format!("{pkg}: no {label} build")),
                }
            }
        }

        self.reporter.section("Downloading");
        let downloads = self.fetcher.download(&items).await;
        report.downloads = BatchCounts::tally(&downloads);
        self.reporter.summary("download", report.downloads);

        let mut archives = Vec::new();
        let mut archive_owners = Vec::new();
        for d in &downloads {
            let Some(owner) = owners.get(&d.url) else {
                continue;
            };
            match (&d.file_path, d.success) {
                (Some(path), true) => {
                    archives.push(path.clone());
                    archive_owners.push(owner.clone());
                }
                _ => {
                    if let Some(slot) = per_version.get_mut(&owner.0) {
                        slot.errors.push(format!(
                            "{}: {}",
                            owner.1,
                            d.error.as_deref().unwrap_or("download failed")
                        ));
                    }
                }
            }
        }

        self.reporter.section("Extracting");
        let extractions = self.extractor.extract(&archives).await;
        report.extractions = BatchCounts::tally(&extractions);
        self.reporter.summary("extract", report.extractions);

        for (result, (version, pkg)) in extractions.into_iter().zip(archive_owners) {
            let Some(slot) = per_version.get_mut(&version) else {
                continue;
            };
            if result.success {
                slot.dirs.insert(pkg, result.extract_path);
            } else {
                slot.errors.push(format!(
                    "{pkg}: {}",
                    result.error.as_deref().unwrap_or("extraction failed")
                ));
            }
        }

        self.reporter.section("Registering");
        let mut ordered: Vec<(VersionId, Extracted)> = per_version.into_iter().collect();
        ordered.sort_by(|a, b| a.0.cmp(&b.0));

        for (version, extracted) in ordered {
            match self.register(&version, &extracted).await {
                Ok(record) => {
                    report.registrations.record(true);
                    self.reporter.done(version.as_str(), "installed");
                    report.installed.push(record);
                }
                Err(reason) => {
                    report.registrations.record(false);
                    self.reporter.failed(version.as_str(), &reason);
                    report.failures.push((version, reason));
                }
            }
        }
        self.reporter.summary("install", report.registrations);

        Ok(report)
    }

    async fn register(
        &self,
        version: &VersionId,
        extracted: &Extracted,
    ) -> Result<InstalledVersion, String> {
        let Some(libc_root) = extracted.dirs.get(LIBC_PACKAGE) else {
            let why = if extracted.errors.is_empty() {
                format!("{LIBC_PACKAGE} was not requested")
            } else {
                extracted.errors.join("; ")
            };
            return Err(why);
        };
        for e in &extracted.errors {
            tracing::warn!("{version}: {e}");
        }

        let libc = find_libc(libc_root)
            .ok_or_else(|| format!("{LIBC_FILE} not found under {}", libc_root.display()))?;

        let debug = extracted
            .dirs
            .get(DEBUG_PACKAGE)
            .and_then(|root| find_debug_dir(root));

        let source = match extracted.dirs.get(SOURCE_PACKAGE) {
            Some(root) => self.expand_source(root).await,
            None => None,
        };

        self.registry
            .add(version, &libc, debug.as_deref(), source.as_deref())
            .map_err(|e| e.to_string())
    }

    /// Expand the bundled source tarball into `<root>/src`.
    async fn expand_source(&self, root: &Path) -> Option<PathBuf> {
        let Some(archive) = find_source_archive(root) else {
            tracing::warn!("no source archive under {}", root.display());
            return None;
        };
        let dest = root.join(SOURCE_DIR);
        let expander = self.source_expander.clone();
        let target = dest.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&target).map_err(|source| ToolError::Io {
                tool: expander.name().to_string(),
                source,
            })?;
            expander.expand(&archive, &target)
        })
        .await;

        match outcome {
            Ok(Ok(())) => Some(dest),
            Ok(Err(e)) => {
                self.reporter
                    .warning(&format!("source expansion failed: {}", e.diagnostic()));
                None
            }
            Err(e) => {
                tracing::warn!("source expansion task failed: {e}");
                None
            }
        }
    }
}

/// First file named `libc.so.6` under `root`.
pub fn find_libc(root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .find(|e| !e.file_type().is_dir() && e.file_name() == LIBC_FILE)
        .map(walkdir::DirEntry::into_path)
}

/// First directory named `debug` under `root`.
pub fn find_debug_dir(root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .find(|e| e.file_type().is_dir() && e.file_name() == "debug")
        .map(walkdir::DirEntry::into_path)
}

/// The `glibc-*.tar.*` archive shipped inside `glibc-source`.
pub fn find_source_archive(root: &Path) -> Option<PathBuf> {
    let base = glob::Pattern::escape(&root.to_string_lossy());
    let pattern = format!("{base}/**/glibc-*.tar.*");
    let mut matches: Vec<PathBuf> = glob::glob(&pattern)
        .ok()?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    matches.sort();
    matches.into_iter().next()
}
