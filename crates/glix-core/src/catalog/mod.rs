//! Version catalog crawler.
//!
//! Walks the Launchpad publishing history of a source package to enumerate
//! every published build, then visits each version's page and its
//! per-architecture build pages to find download URLs for the requested
//! binary packages.
//!
//! # Implementation Note: Failure Isolation
//!
//! Only the initial record count is fatal: without it there is nothing to
//! enumerate. Everything after that degrades per item. A failed history page
//! loses the versions on that page, a failed version page becomes a
//! [`VersionInfo`] with `error` set, and a failed build page turns into a
//! per-package error message.

mod html;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use glix_schema::{
    ArchitectureInfo, BatchCounts, ERR_NO_FILES, ERR_PACKAGE_NOT_FOUND, PackageInfo, VersionId,
    VersionInfo,
};
use reqwest::{Client, Url};
use thiserror::Error;

use crate::config::CatalogSettings;

pub use html::{BuildLink, FileEntry, parse_size};

/// Records per publishing-history page.
pub const DEFAULT_PAGE_SIZE: usize = 300;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid catalog URL {0}")]
    Url(String),

    #[error("Unexpected page structure at {url}: {what}")]
    Parse { url: String, what: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn join(base: &Url, path: &str) -> Result<Url, CatalogError> {
    base.join(path)
        .map_err(|e| CatalogError::Url(format!("{path}: {e}")))
}

/// Which archive and source package to crawl.
#[derive(Debug, Clone)]
pub struct CatalogSource {
    base: Url,
    distro: String,
    source_package: String,
}

impl CatalogSource {
    /// Build a source from a base URL such as `https://launchpad.net/`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute URL.
    pub fn new(base_url: &str, distro: &str, source_package: &str) -> Result<Self, CatalogError> {
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        Ok(Self {
            base: Url::parse(&normalized)
                .map_err(|e| CatalogError::Url(format!("{normalized}: {e}")))?,
            distro: distro.to_string(),
            source_package: source_package.to_string(),
        })
    }

    fn source_path(&self) -> String {
        format!("{}/+source/{}", self.distro, self.source_package)
    }

    /// Publishing history index.
    pub fn history_url(&self) -> Result<Url, CatalogError> {
        join(
            &self.base,
            &format!("{}/+publishinghistory", self.source_path()),
        )
    }

    /// One page of the publishing history.
    pub fn history_page_url(&self, start: usize, batch: usize) -> Result<Url, CatalogError> {
        join(
            &self.base,
            &format!(
                "{}/+publishinghistory?batch={batch}&memo={start}&start={start}",
                self.source_path()
            ),
        )
    }

    /// Detail page of one version.
    pub fn version_url(&self, version: &VersionId) -> Result<Url, CatalogError> {
        join(&self.base, &format!("{}/{}", self.source_path(), version))
    }

    /// Resolve a link found on a page against the archive root.
    pub fn resolve(&self, href: &str) -> Result<Url, CatalogError> {
        join(&self.base, href)
    }
}

/// Crawls the catalog with bounded concurrency.
#[derive(Debug, Clone)]
pub struct Crawler {
    client: Client,
    source: CatalogSource,
    page_size: usize,
    page_workers: usize,
    version_workers: usize,
}

impl Crawler {
    pub fn new(client: Client, source: CatalogSource) -> Self {
        let defaults = CatalogSettings::default();
        Self {
            client,
            source,
            page_size: DEFAULT_PAGE_SIZE,
            page_workers: defaults.page_workers,
            version_workers: defaults.version_workers,
        }
    }

    /// Build a crawler with its own HTTP client from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn from_settings(settings: &CatalogSettings) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        let source = CatalogSource::new(
            &settings.base_url,
            &settings.distro,
            &settings.source_package,
        )?;
        Ok(Self::new(client, source).with_workers(settings.page_workers, settings.version_workers))
    }

    pub fn with_workers(mut self, page_workers: usize, version_workers: usize) -> Self {
        self.page_workers = page_workers.max(1);
        self.version_workers = version_workers.max(1);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn source(&self) -> &CatalogSource {
        &self.source
    }

    async fn get_text(&self, url: Url) -> Result<String, reqwest::Error> {
        tracing::debug!("GET {url}");
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }

    /// Total number of publishing records.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be fetched or shows no count.
    pub async fn version_count(&self) -> Result<usize, CatalogError> {
        let url = self.source.history_url()?;
        let html = self.get_text(url.clone()).await?;
        html::parse_result_count(&html).ok_or(CatalogError::Parse {
            url: url.to_string(),
            what: "result count",
        })
    }

    async fn fetch_listing_page(&self, start: usize) -> Result<Vec<String>, CatalogError> {
        let url = self.source.history_page_url(start, self.page_size)?;
        let html = self.get_text(url).await?;
        Ok(html::parse_listing_versions(&html))
    }

    /// Enumerate every published version, sorted by numeric key.
    ///
    /// # Errors
    ///
    /// Returns an error only if the record count cannot be read. Individual
    /// page failures are logged and skipped.
    pub async fn discover_versions(&self) -> Result<Vec<VersionId>, CatalogError> {
        let total = self.version_count().await?;
        tracing::info!("{total} publishing records to scan");

        let starts: Vec<usize> = (0..total).step_by(self.page_size).collect();
        let pages: Vec<(usize, Result<Vec<String>, CatalogError>)> = stream::iter(starts)
            .map(|start| async move { (start, self.fetch_listing_page(start).await) })
            .buffer_unordered(self.page_workers)
            .collect()
            .await;

        let mut raw = Vec::new();
        for (start, page) in pages {
            match page {
                Ok(versions) => raw.extend(versions),
                Err(e) => tracing::warn!("history page at {start} failed: {e}"),
            }
        }

        Ok(glix_schema::sort_versions(raw))
    }

    /// Locate `package_names` in every build of `version` whose label matches
    /// one of `archs` (case-insensitive).
    ///
    /// Never fails: a version page that cannot be read is reported through
    /// [`VersionInfo::error`], build problems through per-package errors.
    pub async fn fetch_packages_for_version(
        &self,
        version: &VersionId,
        archs: &[String],
        package_names: &[String],
    ) -> VersionInfo {
        let url = match self.source.version_url(version) {
            Ok(u) => u,
            Err(e) => {
                let mut info = VersionInfo::new(version.clone(), "");
                info.error = Some(e.to_string());
                return info;
            }
        };
        let mut info = VersionInfo::new(version.clone(), url.as_str());

        let html = match self.get_text(url).await {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!("version page for {version} failed: {e}");
                info.error = Some(format!("Network error: {e}"));
                return info;
            }
        };

        let wanted: Vec<String> = archs.iter().map(|a| a.to_lowercase()).collect();

        for link in html::parse_build_links(&html) {
            let label = link.label.to_lowercase();
            if !wanted.contains(&label) || info.architectures.contains_key(&label) {
                continue;
            }

            let build_url = match self.source.resolve(&link.href) {
                Ok(u) => u,
                Err(e) => {
                    tracing::warn!("bad build link {:?} for {version}: {e}", link.href);
                    continue;
                }
            };

            let packages = self.fetch_build(build_url.clone(), package_names).await;
            info.architectures.insert(
                label,
                ArchitectureInfo {
                    build_url: build_url.to_string(),
                    packages,
                },
            );
        }

        info
    }

    async fn fetch_build(
        &self,
        build_url: Url,
        package_names: &[String],
    ) -> BTreeMap<String, PackageInfo> {
        let all = |error: String| -> BTreeMap<String, PackageInfo> {
            package_names
                .iter()
                .map(|p| (p.clone(), PackageInfo::missing(error.clone())))
                .collect()
        };

        let html = match self.get_text(build_url.clone()).await {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!("build page {build_url} failed: {e}");
                return all(format!("Network error: {e}"));
            }
        };

        let files = html::parse_file_entries(&html);
        if files.is_empty() {
            return all(ERR_NO_FILES.to_string());
        }

        let mut packages = all(ERR_PACKAGE_NOT_FOUND.to_string());
        for file in &files {
            let name = file.package_name();
            if let Some(slot) = packages.get_mut(name) {
                let url = match self.source.resolve(&file.href) {
                    Ok(u) => u.to_string(),
                    Err(_) => file.href.clone(),
                };
                *slot = PackageInfo::found(url, parse_size(&file.size_text));
            }
        }
        packages
    }

    /// Discover every version and locate the requested packages in each.
    ///
    /// # Errors
    ///
    /// Fails only if discovery itself fails; per-version problems are kept in
    /// the returned records.
    pub async fn fetch_all(
        &self,
        archs: &[String],
        package_names: &[String],
    ) -> Result<BTreeMap<VersionId, VersionInfo>, CatalogError> {
        let versions = self.discover_versions().await?;
        tracing::info!(
            "fetching packages for {} versions ({} workers)",
            versions.len(),
            self.version_workers
        );
        Ok(self.fetch_versions(&versions, archs, package_names).await)
    }

    /// Locate packages for an explicit list of versions, concurrently.
    pub async fn fetch_versions(
        &self,
        versions: &[VersionId],
        archs: &[String],
        package_names: &[String],
    ) -> BTreeMap<VersionId, VersionInfo> {
        stream::iter(versions.iter().cloned())
            .map(|v| async move {
                let info = self.fetch_packages_for_version(&v, archs, package_names).await;
                (v, info)
            })
            .buffer_unordered(self.version_workers)
            .collect()
            .await
    }
}

/// Counts over every requested (version, architecture, package) slot.
pub fn package_counts(results: &BTreeMap<VersionId, VersionInfo>) -> BatchCounts {
    let mut counts = BatchCounts::default();
    for info in results.values() {
        for arch in info.architectures.values() {
            for pkg in arch.packages.values() {
                counts.record(pkg.is_available());
            }
        }
    }
    counts
}

/// Write crawl results as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn save_json(
    results: &BTreeMap<VersionId, VersionInfo>,
    path: &Path,
) -> Result<(), CatalogError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    const ROOT: &str = "/ubuntu/+source/glibc";

    fn history_page(versions: &[&str]) -> String {
        let rows: String = versions
            .iter()
            .map(|v| format!("<tr><td>x</td><td><a href=\"{ROOT}/{v}\">{v}</a></td></tr>"))
            .collect();
        format!("<table id=\"publishing-summary\"><tbody>{rows}</tbody></table>")
    }

    fn crawler(server: &Server) -> Crawler {
        let source = CatalogSource::new(&server.url(), "ubuntu", "glibc").unwrap();
        Crawler::new(Client::new(), source)
            .with_page_size(2)
            .with_workers(2, 2)
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_discover_versions_dedups_and_sorts_numerically() {
        let mut server = Server::new_async().await;
        let _count = server
            .mock("GET", format!("{ROOT}/+publishinghistory").as_str())
            .with_body("<td>1 &rarr; 2 of 4 results</td>")
            .create_async()
            .await;
        let _p0 = server
            .mock(
                "GET",
                format!("{ROOT}/+publishinghistory?batch=2&memo=0&start=0").as_str(),
            )
            .with_body(history_page(&["2.31-0ubuntu10", "2.31-0ubuntu9"]))
            .create_async()
            .await;
        let _p2 = server
            .mock(
                "GET",
                format!("{ROOT}/+publishinghistory?batch=2&memo=2&start=2").as_str(),
            )
            .with_body(history_page(&["2.31-0ubuntu9", "2.27-3ubuntu1"]))
            .create_async()
            .await;

        let versions = crawler(&server).discover_versions().await.unwrap();
        let raw: Vec<&str> = versions.iter().map(VersionId::as_str).collect();
        assert_eq!(raw, ["2.27-3ubuntu1", "2.31-0ubuntu9", "2.31-0ubuntu10"]);
    }

    #[tokio::test]
    async fn test_discover_versions_tolerates_failed_page() {
        let mut server = Server::new_async().await;
        let _count = server
            .mock("GET", format!("{ROOT}/+publishinghistory").as_str())
            .with_body("of 4 results")
            .create_async()
            .await;
        let _p0 = server
            .mock(
                "GET",
                format!("{ROOT}/+publishinghistory?batch=2&memo=0&start=0").as_str(),
            )
            .with_body(history_page(&["2.35-0ubuntu3"]))
            .create_async()
            .await;
        let _p2 = server
            .mock(
                "GET",
                format!("{ROOT}/+publishinghistory?batch=2&memo=2&start=2").as_str(),
            )
            .with_status(500)
            .create_async()
            .await;

        let versions = crawler(&server).discover_versions().await.unwrap();
        assert_eq!(versions.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_count_is_parse_error() {
        let mut server = Server::new_async().await;
        let _count = server
            .mock("GET", format!("{ROOT}/+publishinghistory").as_str())
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let err = crawler(&server).discover_versions().await.unwrap_err();
        assert!(matches!(err, CatalogError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_fetch_packages_for_version() {
        let mut server = Server::new_async().await;
        let base = server.url();
        let version: VersionId = "2.31-0ubuntu9".parse().unwrap();

        let _page = server
            .mock("GET", format!("{ROOT}/2.31-0ubuntu9").as_str())
            .with_body(format!(
                "<div id=\"source-builds\"><p>\
                 <a href=\"{ROOT}/2.31-0ubuntu9/+build/1\">AMD64</a>\
                 <a href=\"{ROOT}/2.31-0ubuntu9/+build/2\">i386</a>\
                 <a href=\"{ROOT}/2.31-0ubuntu9/+build/3\">arm64</a></p></div>"
            ))
            .create_async()
            .await;
        let _b1 = server
            .mock("GET", format!("{ROOT}/2.31-0ubuntu9/+build/1").as_str())
            .with_body(format!(
                "<div id=\"files\"><ul>\
                 <li><a href=\"{base}/files/libc6_2.31-0ubuntu9_amd64.deb\">libc6_2.31-0ubuntu9_amd64.deb</a> (2.6 MiB)</li>\
                 </ul></div>"
            ))
            .create_async()
            .await;
        let _b2 = server
            .mock("GET", format!("{ROOT}/2.31-0ubuntu9/+build/2").as_str())
            .with_body("<div id=\"files\"><p>Nothing built.</p></div>")
            .create_async()
            .await;

        let info = crawler(&server)
            .fetch_packages_for_version(
                &version,
                &strings(&["amd64", "i386"]),
                &strings(&["libc6", "libc6-dbg"]),
            )
            .await;

        assert!(info.error.is_none());
        assert_eq!(info.architectures.len(), 2);

        let libc = info.package("amd64", "libc6").unwrap();
        assert!(libc.is_available());
        assert!(libc.url.ends_with("/files/libc6_2.31-0ubuntu9_amd64.deb"));
        assert_eq!(libc.size, parse_size("2.6 MiB"));

        let dbg = info.package("amd64", "libc6-dbg").unwrap();
        assert_eq!(dbg.error.as_deref(), Some(ERR_PACKAGE_NOT_FOUND));

        let i386 = info.package("i386", "libc6").unwrap();
        assert_eq!(i386.error.as_deref(), Some(ERR_NO_FILES));
    }

    #[tokio::test]
    async fn test_build_page_network_error_is_per_package() {
        let mut server = Server::new_async().await;
        let version: VersionId = "2.35-0ubuntu3".parse().unwrap();

        let _page = server
            .mock("GET", format!("{ROOT}/2.35-0ubuntu3").as_str())
            .with_body(format!(
                "<div id=\"source-builds\"><p><a href=\"{ROOT}/2.35-0ubuntu3/+build/9\">amd64</a></p></div>"
            ))
            .create_async()
            .await;
        let _build = server
            .mock("GET", format!("{ROOT}/2.35-0ubuntu3/+build/9").as_str())
            .with_status(503)
            .create_async()
            .await;

        let info = crawler(&server)
            .fetch_packages_for_version(&version, &strings(&["amd64"]), &strings(&["libc6"]))
            .await;

        let libc = info.package("amd64", "libc6").unwrap();
        assert!(libc.error.as_deref().unwrap().starts_with("Network error"));
    }

    #[tokio::test]
    async fn test_build_without_file_list_ignores_page_navigation() {
        let mut server = Server::new_async().await;
        let version: VersionId = "2.27-3ubuntu1".parse().unwrap();

        let _page = server
            .mock("GET", format!("{ROOT}/2.27-3ubuntu1").as_str())
            .with_body(format!(
                "<div id=\"source-builds\"><div class=\"series\">Bionic</div>\
                 <p><a href=\"{ROOT}/2.27-3ubuntu1/+build/7\">amd64</a></p></div>"
            ))
            .create_async()
            .await;
        let _build = server
            .mock("GET", format!("{ROOT}/2.27-3ubuntu1/+build/7").as_str())
            .with_body(
                "<div id=\"files\"><h2>Built files</h2><p>No files</p></div>\
                 <ul class=\"nav\"><li><a href=\"/ubuntu\">Ubuntu</a></li></ul>",
            )
            .create_async()
            .await;

        let info = crawler(&server)
            .fetch_packages_for_version(&version, &strings(&["amd64"]), &strings(&["libc6"]))
            .await;

        let libc = info.package("amd64", "libc6").unwrap();
        assert_eq!(libc.error.as_deref(), Some(ERR_NO_FILES));
    }

    #[tokio::test]
    async fn test_fetch_all_records_failed_versions() {
        let mut server = Server::new_async().await;
        let _count = server
            .mock("GET", format!("{ROOT}/+publishinghistory").as_str())
            .with_body("of 2 results")
            .create_async()
            .await;
        let _p0 = server
            .mock(
                "GET",
                format!("{ROOT}/+publishinghistory?batch=2&memo=0&start=0").as_str(),
            )
            .with_body(history_page(&["2.31-0ubuntu9", "2.35-0ubuntu3"]))
            .create_async()
            .await;
        let _ok = server
            .mock("GET", format!("{ROOT}/2.31-0ubuntu9").as_str())
            .with_body("<div id=\"source-builds\"><p></p></div>")
            .create_async()
            .await;
        let _bad = server
            .mock("GET", format!("{ROOT}/2.35-0ubuntu3").as_str())
            .with_status(404)
            .create_async()
            .await;

        let results = crawler(&server)
            .fetch_all(&strings(&["amd64"]), &strings(&["libc6"]))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        let ok: VersionId = "2.31-0ubuntu9".parse().unwrap();
        let bad: VersionId = "2.35-0ubuntu3".parse().unwrap();
        assert!(results[&ok].error.is_none());
        assert!(results[&bad].error.is_some());
        assert!(package_counts(&results).is_empty());
    }

    #[test]
    fn test_save_json() {
        let dir = tempfile::tempdir().unwrap();
        let v: VersionId = "2.31-0ubuntu9".parse().unwrap();
        let mut results = BTreeMap::new();
        results.insert(v.clone(), VersionInfo::new(v, "https://x"));

        let path = dir.path().join("out/catalog.json");
        save_json(&results, &path).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("\"2.31-0ubuntu9\""));
    }
}
