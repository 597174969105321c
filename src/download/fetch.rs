//! Audio stream transport

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::DownloadError;

/// Most we reserve up front from a server-declared length (16MB)
const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;

/// Receives byte counts while a transfer is running
pub trait ProgressSink: Send + Sync {
    fn report(&self, received: u64, total: Option<u64>);
}

/// Fetches the raw bytes behind a download URL
///
/// Implementations map transport failures (including timeouts) to
/// [`DownloadError::Transport`] and a transport-level interruption to
/// [`DownloadError::Cancelled`]; they must not retry.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, progress: &dyn ProgressSink) -> Result<Bytes, DownloadError>;
}

/// Streams audio over HTTP with reqwest
#[derive(Clone)]
pub struct HttpFetcher {
    http_client: Client,
}

impl HttpFetcher {
    /// Create a fetcher; `read_timeout` bounds how long a stalled stream may sit idle
    pub fn new(read_timeout: Duration) -> Result<Self, DownloadError> {
        let http_client = Client::builder()
            .user_agent(concat!("tunegrab/", env!("CARGO_PKG_VERSION")))
            .read_timeout(read_timeout)
            .build()?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, progress: &dyn ProgressSink) -> Result<Bytes, DownloadError> {
        debug!("Downloading: {}", url);

        let response = self
            .http_client
            .get(url)
            .send()
            .await?
            .error_for_status()?;

        let total = response.content_length();
        // The declared length is untrusted; beyond the cap the buffer grows with the data
        let reserve = total.unwrap_or(0).min(MAX_PREALLOCATION);
        let mut buffer = BytesMut::with_capacity(usize::try_from(reserve).unwrap_or(0));
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);
            progress.report(buffer.len() as u64, total);
        }

        if let Some(total) = total {
            if (buffer.len() as u64) < total {
                return Err(DownloadError::Transport(format!(
                    "stream ended after {} of {} bytes",
                    buffer.len(),
                    total
                )));
            }
        }

        debug!("Downloaded {} bytes from {}", buffer.len(), url);
        Ok(buffer.freeze())
    }
}
