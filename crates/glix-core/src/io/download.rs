//! Batch package downloads with bounded concurrency and per-file retries.
//!
//! Each file is streamed straight to `download_dir/<basename>`; nothing is
//! buffered whole in memory. Failures are recorded in the returned
//! [`DownloadResult`] rather than raised, so one bad URL never sinks a batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use glix_schema::DownloadResult;
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::config::DownloadSettings;
use crate::{NullReporter, Reporter};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Downloads batches of `(url, expected size)` pairs.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    download_dir: PathBuf,
    settings: DownloadSettings,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("download_dir", &self.download_dir)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Build a fetcher with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(settings: DownloadSettings, download_dir: PathBuf) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(settings.timeout())
            .build()?;
        Ok(Self::with_client(client, settings, download_dir))
    }

    pub fn with_client(client: Client, settings: DownloadSettings, download_dir: PathBuf) -> Self {
        Self {
            client,
            download_dir,
            settings,
            reporter: Arc::new(NullReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Download every item, returning one result per item in input order.
    ///
    /// The expected size is only a progress hint when the server sends no
    /// `Content-Length`.
    pub async fn download(&self, items: &[(String, u64)]) -> Vec<DownloadResult> {
        if items.is_empty() {
            return Vec::new();
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.download_dir).await {
            let reason = format!(
                "cannot create {}: {e}",
                self.download_dir.display()
            );
            tracing::warn!("{reason}");
            return items
                .iter()
                .map(|(url, _)| DownloadResult {
                    url: url.clone(),
                    success: false,
                    file_path: None,
                    error: Some(reason.clone()),
                    bytes: 0,
                })
                .collect();
        }

        tracing::info!(
            "downloading {} files ({} workers)",
            items.len(),
            self.settings.max_workers
        );

        stream::iter(items)
            .map(|(url, size)| self.fetch_one(url, *size))
            .buffered(self.settings.max_workers.max(1))
            .collect()
            .await
    }

    /// Download one URL, retrying on any transport or status error.
    pub async fn fetch_one(&self, url: &str, expected_size: u64) -> DownloadResult {
        let name = crate::filename_from_url(url);
        let dest = self.download_dir.join(name);
        let attempts = self.settings.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.stream_to(url, &dest, name, expected_size).await {
                Ok(bytes) => {
                    self.reporter.done(name, &format_bytes(bytes));
                    return DownloadResult {
                        url: url.to_string(),
                        success: true,
                        file_path: Some(dest),
                        error: None,
                        bytes,
                    };
                }
                Err(e) => {
                    tracing::warn!("{name}: attempt {attempt}/{attempts} failed: {e}");
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_delay()).await;
                    }
                }
            }
        }

        self.reporter.failed(name, &last_error);
        DownloadResult {
            url: url.to_string(),
            success: false,
            file_path: None,
            error: Some(last_error),
            bytes: 0,
        }
    }

    async fn stream_to(
        &self,
        url: &str,
        dest: &Path,
        name: &str,
        expected_size: u64,
    ) -> Result<u64, FetchError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let total = response
            .content_length()
            .or((expected_size > 0).then_some(expected_size));

        let file = File::create(dest).await?;
        let mut writer = BufWriter::with_capacity(self.settings.chunk_size.max(1), file);
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        self.reporter.downloading(name, 0, total);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            self.reporter.downloading(name, downloaded, total);
        }
        writer.flush().await?;

        Ok(downloaded)
    }
}

/// Human-readable byte count, e.g. `2.6 MiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
