//! Transport for feeds and docset archives
//!
//! `HttpFetcher` speaks http(s) through reqwest and reads `file://` URLs and
//! plain paths from the local filesystem. Downloads stream to disk, report
//! byte progress after every chunk and stop as soon as the job's
//! cancellation token fires.

use crate::error::{DocsetError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Byte progress callback: (bytes received, total if known)
pub type ByteProgress<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// Default request timeout for feed documents
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const LOCAL_CHUNK_SIZE: usize = 64 * 1024;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a whole document as text
    async fn fetch_text(&self, url: &str) -> Result<String>;

    /// Stream `url` into `dest`, returning the number of bytes written
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: ByteProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64>;
}

/// Where a URL points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Remote(String),
    Local(PathBuf),
}

impl Source {
    pub fn parse(url: &str) -> Self {
        if let Some(path) = url.strip_prefix("file://") {
            Source::Local(PathBuf::from(path))
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Source::Remote(url.to_string())
        } else {
            Source::Local(PathBuf::from(url))
        }
    }
}

pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("docshelf/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .build()
            .map_err(|e| DocsetError::transport("http client", e))?;

        Ok(Self { client, timeout })
    }

    async fn get(&self, url: &str, timeout: Option<Duration>) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DocsetError::transport(url, e))?;

        if !response.status().is_success() {
            return Err(DocsetError::transport(
                url,
                format!("HTTP {}", response.status()),
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        match Source::parse(url) {
            Source::Local(path) => tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| DocsetError::transport(url, e)),
            Source::Remote(url) => {
                tracing::debug!("Fetching {}", url);
                self.get(&url, Some(self.timeout))
                    .await?
                    .text()
                    .await
                    .map_err(|e| DocsetError::transport(url, e))
            }
        }
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: ByteProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| DocsetError::transport(url, format!("cannot create {}: {e}", dest.display())))?;

        let received = match Source::parse(url) {
            Source::Local(path) => copy_local(url, &path, &mut file, progress, cancel).await?,
            Source::Remote(_) => {
                let mut response = self.get(url, None).await?;
                let total = response.content_length();
                let mut received = 0u64;
                progress(received, total);

                loop {
                    let chunk = tokio::select! {
                        _ = cancel.cancelled() => return Err(DocsetError::cancelled(url)),
                        chunk = response.chunk() => chunk.map_err(|e| DocsetError::transport(url, e))?,
                    };
                    let Some(chunk) = chunk else { break };

                    file.write_all(&chunk)
                        .await
                        .map_err(|e| DocsetError::transport(url, e))?;
                    received += chunk.len() as u64;
                    progress(received, total);
                }
                received
            }
        };

        file.flush()
            .await
            .map_err(|e| DocsetError::transport(url, e))?;
        tracing::debug!("Downloaded {} bytes from {}", received, url);
        Ok(received)
    }
}

async fn copy_local(
    url: &str,
    path: &Path,
    out: &mut tokio::fs::File,
    progress: ByteProgress<'_>,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut input = tokio::fs::File::open(path)
        .await
        .map_err(|e| DocsetError::transport(url, e))?;
    let total = input.metadata().await.ok().map(|m| m.len());

    let mut buf = vec![0u8; LOCAL_CHUNK_SIZE];
    let mut received = 0u64;
    progress(received, total);

    loop {
        if cancel.is_cancelled() {
            return Err(DocsetError::cancelled(url));
        }
        let n = input
            .read(&mut buf)
            .await
            .map_err(|e| DocsetError::transport(url, e))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])
            .await
            .map_err(|e| DocsetError::transport(url, e))?;
        received += n as u64;
        progress(received, total);
    }

    Ok(received)
}
