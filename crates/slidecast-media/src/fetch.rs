//! Fetching scene images and narration audio.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use crate::error::{MediaError, MediaResult};

/// Fetch-by-reference of input media.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch `reference` into `dest`, returning the number of bytes written.
    async fn fetch(&self, reference: &str, dest: &Path) -> MediaResult<u64>;
}

/// Fetches `http(s)://` references with reqwest.
///
/// `file://` URLs and plain paths are refused unless a local input root is
/// configured, and then only resolve to files inside that root.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    local_root: Option<PathBuf>,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(client)
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            local_root: None,
        }
    }

    /// Allow local references that resolve inside `root`.
    pub fn with_local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_root = Some(root.into());
        self
    }

    async fn fetch_http(&self, url: Url, dest: &Path) -> MediaResult<u64> {
        let reference = url.to_string();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| MediaError::download_failed(format!("{}: {}", reference, e)))?;

        let mut file = fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let data =
                chunk.map_err(|e| MediaError::download_failed(format!("{}: {}", reference, e)))?;
            file.write_all(&data).await?;
            written += data.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    async fn copy_local(&self, source: &Path, dest: &Path) -> MediaResult<u64> {
        let source = self.resolve_local(source).await?;
        fs::copy(&source, dest)
            .await
            .map_err(|e| MediaError::download_failed(format!("{}: {}", source.display(), e)))
    }

    /// Canonical form of `source`, provided it lies inside the local root.
    async fn resolve_local(&self, source: &Path) -> MediaResult<PathBuf> {
        let root = self.local_root.as_ref().ok_or_else(|| {
            MediaError::download_failed(format!(
                "{}: local file references are disabled",
                source.display()
            ))
        })?;

        let root = fs::canonicalize(root).await.map_err(|e| {
            MediaError::download_failed(format!("local input root {}: {}", root.display(), e))
        })?;
        let candidate = if source.is_relative() {
            root.join(source)
        } else {
            source.to_path_buf()
        };
        let resolved = fs::canonicalize(&candidate)
            .await
            .map_err(|e| MediaError::download_failed(format!("{}: {}", source.display(), e)))?;

        if !resolved.starts_with(&root) {
            return Err(MediaError::download_failed(format!(
                "{}: outside the local input root",
                source.display()
            )));
        }
        Ok(resolved)
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, reference: &str, dest: &Path) -> MediaResult<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        debug!(reference, dest = %dest.display(), "Fetching input");

        match Url::parse(reference) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => self.fetch_http(url, dest).await,
            Ok(url) if url.scheme() == "file" => {
                let source = url
                    .to_file_path()
                    .map_err(|_| MediaError::download_failed(format!("invalid file url: {}", reference)))?;
                self.copy_local(&source, dest).await
            }
            Ok(url) if url.scheme().len() > 1 => Err(MediaError::download_failed(format!(
                "unsupported scheme '{}' in {}",
                url.scheme(),
                reference
            ))),
            // Plain paths (and Windows drive letters parsed as schemes)
            _ => self.copy_local(&PathBuf::from(reference), dest).await,
        }
    }
}
