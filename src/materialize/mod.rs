//! File materialization: streaming a resolved payload URL to local disk.
//!
//! The resolver hands over a fully resolved download exactly once; the
//! materializer owns everything after that point: the skip-if-exists policy,
//! directory creation, the authenticated payload GET, and the streaming
//! write. It is deliberately behind a trait so the resolver can be exercised
//! against a recording implementation in tests.

use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::COOKIE;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// A fully resolved download, produced by the resolver and consumed exactly
/// once. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct ResolvedDownload {
    /// The final payload URL.
    pub url: String,
    /// The `Cookie` header to present, when the target host needs one.
    /// `None` for token-authenticated URLs.
    pub cookie_header: Option<String>,
    /// The local directory the file belongs in.
    pub folder: PathBuf,
    /// The target file name within `folder`.
    pub file_name: String,
}

impl ResolvedDownload {
    /// The full local path the payload lands at.
    #[must_use]
    pub fn target_path(&self) -> PathBuf {
        self.folder.join(&self.file_name)
    }
}

/// Errors that can occur while materializing a download.
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// Network-level error issuing the payload request.
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP error response for the payload request.
    #[error("HTTP {status} downloading {url}")]
    Status {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The transfer broke off mid-stream.
    #[error("transfer interrupted downloading {url}: {source}")]
    Interrupted {
        /// The URL whose body stream failed.
        url: String,
        /// The underlying stream error.
        #[source]
        source: reqwest::Error,
    },

    /// File system error during the write.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// HTTP client construction failed.
    #[error("HTTP client construction failed: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl MaterializeError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Outcome of a successful materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    /// The payload was written to disk.
    Written {
        /// The local path written.
        path: PathBuf,
        /// Bytes written.
        bytes: u64,
    },
    /// A file already existed at the target path and skip-existing is on;
    /// no network request was made.
    SkippedExisting {
        /// The pre-existing local path.
        path: PathBuf,
    },
}

/// Sink for resolved downloads.
///
/// # Object Safety
///
/// Uses `async_trait` so the resolver can hold `Arc<dyn Materializer>`;
/// Rust 2024 native async traits are not object-safe.
#[async_trait]
pub trait Materializer: Send + Sync {
    /// Consumes a resolved download, writing it to its target path.
    ///
    /// # Errors
    ///
    /// Returns [`MaterializeError`] on request or write failure. A failed
    /// materialization aborts only its own file, never the run.
    async fn materialize(&self, download: &ResolvedDownload)
    -> Result<Materialized, MaterializeError>;
}

/// Disk-backed materializer used by the real pipeline.
///
/// Owns its own HTTP client: payload hosts redirect to CDN mirrors, so this
/// client follows redirects, unlike the hop fetcher. Only a connect timeout
/// is applied; a total read timeout would cap payload size by bandwidth.
#[derive(Debug)]
pub struct DiskMaterializer {
    client: Client,
    skip_existing: bool,
}

impl DiskMaterializer {
    /// Creates a disk materializer.
    ///
    /// # Errors
    ///
    /// Returns [`MaterializeError::ClientBuild`] when client construction
    /// fails.
    pub fn new(skip_existing: bool) -> Result<Self, MaterializeError> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .gzip(true)
            .build()
            .map_err(MaterializeError::ClientBuild)?;
        Ok(Self {
            client,
            skip_existing,
        })
    }
}

#[async_trait]
impl Materializer for DiskMaterializer {
    #[instrument(
        level = "debug",
        skip(self, download),
        fields(url = %download.url, path = %download.target_path().display())
    )]
    async fn materialize(
        &self,
        download: &ResolvedDownload,
    ) -> Result<Materialized, MaterializeError> {
        let path = download.target_path();

        if self.skip_existing && path.exists() {
            info!(path = %path.display(), "file already exists; skipping");
            return Ok(Materialized::SkippedExisting { path });
        }

        tokio::fs::create_dir_all(&download.folder)
            .await
            .map_err(|e| MaterializeError::io(&download.folder, e))?;

        let mut request = self.client.get(&download.url);
        if let Some(cookie) = download.cookie_header.as_deref().filter(|c| !c.is_empty()) {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await.map_err(|e| MaterializeError::Network {
            url: download.url.clone(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MaterializeError::Status {
                url: download.url.clone(),
                status: status.as_u16(),
            });
        }

        let mut file = File::create(&path)
            .await
            .map_err(|e| MaterializeError::io(&path, e))?;

        let mut stream = response.bytes_stream();
        let mut bytes: u64 = 0;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| MaterializeError::io(&path, e))?;
                    bytes += chunk.len() as u64;
                }
                Err(source) => {
                    // Drop the partial file so a re-run does not mistake it
                    // for a completed download.
                    drop(file);
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(MaterializeError::Interrupted {
                        url: download.url.clone(),
                        source,
                    });
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| MaterializeError::io(&path, e))?;
        debug!(bytes, "payload written");

        Ok(Materialized::Written { path, bytes })
    }
}
