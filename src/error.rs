//! Error types for tunegrab
//!
//! Every per-item failure ends up as a [`DownloadError`] and is surfaced as an
//! `error` event for that item; it never propagates to the caller of
//! `enqueue`. Catalog and tagging failures convert into it at the item boundary.

use thiserror::Error;

/// Boxed error used to carry an arbitrary cause
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of a single download item
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Fetching the audio stream or persisting the result failed
    #[error("transport error: {0}")]
    Transport(String),

    /// The transfer was interrupted, explicitly or by the transport
    #[error("download interrupted")]
    Cancelled,

    /// Anything else, with the original failure kept as the cause
    #[error("unexpected failure: {0}")]
    Unknown(#[source] BoxError),
}

impl DownloadError {
    /// Wrap an arbitrary error as [`DownloadError::Unknown`]
    pub fn unknown(err: impl Into<BoxError>) -> Self {
        Self::Unknown(err.into())
    }

    /// Whether this error represents an interruption rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<CatalogError> for DownloadError {
    fn from(err: CatalogError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<TagError> for DownloadError {
    fn from(err: TagError) -> Self {
        Self::Unknown(Box::new(err))
    }
}

/// Errors from the remote music catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Request could not be sent or the body could not be read
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Catalog answered with a non-success status
    #[error("catalog returned status {status} for {url}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Requested entity does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Catalog returned an error payload
    #[error("catalog error {name}: {message}")]
    Api {
        /// Machine-readable error name
        name: String,
        /// Human-readable message
        message: String,
    },

    /// Response body did not match the expected shape
    #[error("failed to decode catalog response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors from the tag writer
#[derive(Debug, Error)]
pub enum TagError {
    /// lofty failed to serialize the tag
    #[error("failed to write ID3v2 tag: {0}")]
    Lofty(#[from] lofty::error::LoftyError),

    /// Blocking tagging task did not finish
    #[error("tagging task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Rejected download request
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    /// A request field failed validation
    #[error("invalid download request: {field} {reason}")]
    Invalid {
        /// Offending field name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}
