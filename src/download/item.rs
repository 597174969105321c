//! Download items and their lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::EnqueueError;

/// Custom data key holding the catalog track id
pub const TRACK_ID_KEY: &str = "trackId";

/// Custom data key holding the album the track was requested from
pub const ALBUM_ID_KEY: &str = "albumId";

/// Unique identifier of a download item, never reused within a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(pub u64);

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a download item
///
/// Allowed transitions: `Queued -> Active -> {Complete, Error, Interrupted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
    Queued,
    Active,
    Complete,
    Error,
    Interrupted,
}

impl DownloadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Interrupted)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Active)
                | (Self::Active, Self::Complete)
                | (Self::Active, Self::Error)
                | (Self::Active, Self::Interrupted)
        )
    }
}

/// Received / total byte counts of an active transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub received: u64,
    /// Total size, if the transport announced one
    pub total: Option<u64>,
}

/// Request to download one audio resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub source_url: String,
    pub title: String,
    pub filename: String,
    pub destination_path: PathBuf,
    /// Opaque context passed through to the completion pipeline
    #[serde(default)]
    pub custom_data: BTreeMap<String, String>,
}

impl DownloadRequest {
    /// Check the request is something the manager can act on
    pub fn validate(&self) -> Result<(), EnqueueError> {
        let url = url::Url::parse(&self.source_url).map_err(|e| EnqueueError::Invalid {
            field: "sourceUrl",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(EnqueueError::Invalid {
                field: "sourceUrl",
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        if self.filename.trim().is_empty() {
            return Err(EnqueueError::Invalid {
                field: "filename",
                reason: "must not be empty".to_string(),
            });
        }
        if self.filename.contains(['/', '\\']) {
            return Err(EnqueueError::Invalid {
                field: "filename",
                reason: "must not contain path separators".to_string(),
            });
        }

        Ok(())
    }
}

/// One requested transfer as seen from outside the manager
///
/// Items never carry the audio bytes: the fetched buffer is owned by the
/// transfer task and moves straight into the completion pipeline, so any
/// snapshot is safe to send across a process boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadItem {
    pub id: DownloadId,
    pub source_url: String,
    pub title: String,
    pub filename: String,
    pub destination_path: PathBuf,
    pub custom_data: BTreeMap<String, String>,
    pub state: DownloadState,
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
    /// Failure message once the item is in `Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadItem {
    pub(crate) fn new(id: DownloadId, request: DownloadRequest) -> Self {
        Self {
            id,
            source_url: request.source_url,
            title: request.title,
            filename: request.filename,
            destination_path: request.destination_path,
            custom_data: request.custom_data,
            state: DownloadState::Queued,
            progress: Progress::default(),
            created_at: Utc::now(),
            error: None,
        }
    }

    /// Full path the finished track is stored at
    pub fn destination(&self) -> PathBuf {
        self.destination_path.join(&self.filename)
    }

    /// Look up a custom data value
    pub fn custom(&self, key: &str) -> Option<&str> {
        self.custom_data.get(key).map(String::as_str)
    }

    /// Move to `next` if the lifecycle allows it
    pub(crate) fn advance(&mut self, next: DownloadState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }

    /// Record transfer progress; counts never go backwards
    ///
    /// Returns whether anything changed.
    pub(crate) fn record_progress(&mut self, received: u64, total: Option<u64>) -> bool {
        let mut changed = false;
        if received > self.progress.received {
            self.progress.received = received;
            changed = true;
        }
        if let Some(total) = total {
            if self.progress.total.is_none_or(|known| total > known) {
                self.progress.total = Some(total);
                changed = true;
            }
        }
        changed
    }
}
