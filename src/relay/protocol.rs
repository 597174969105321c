//! Cross-process message protocol
//!
//! Commands and messages are JSON objects tagged by a `type` field, e.g.
//! `{"type": "DOWNLOAD_TRACK", "trackId": "42"}`. Items inside messages are
//! [`DownloadItem`] snapshots, which never carry audio bytes.

use serde::{Deserialize, Serialize};

use crate::download::{DownloadId, DownloadItem, Event};

/// Request coming from the UI side
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    DownloadTrack { track_id: String },
    DownloadAlbum { album_id: String },
    DownloadPlaylist { owner: String, kind: String },
    DownloadArtist { artist_id: String },
    ListDownloadItems,
    InterruptDownload { download_item_id: DownloadId },
}

/// Lifecycle event kinds forwarded in `DOWNLOAD_EVENT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadEventType {
    Add,
    Progress,
    Interrupted,
    Complete,
}

/// Message sent to the UI side
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Message {
    DownloadEvent {
        event_type: DownloadEventType,
        item: DownloadItem,
    },
    DownloadErrorEvent {
        item: DownloadItem,
        error: String,
    },
    /// Failure not tied to a single item
    ErrorEvent { error: String },
    /// Reply to `LIST_DOWNLOAD_ITEMS`
    DownloadItems { items: Vec<DownloadItem> },
}

impl Message {
    pub fn error(error: impl Into<String>) -> Self {
        Self::ErrorEvent {
            error: error.into(),
        }
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        let (event_type, item) = match event {
            Event::Added(item) => (DownloadEventType::Add, item),
            Event::Progress(item) => (DownloadEventType::Progress, item),
            Event::Interrupted(item) => (DownloadEventType::Interrupted, item),
            Event::Completed(item) => (DownloadEventType::Complete, item),
            Event::Failed { item, error } => return Self::DownloadErrorEvent { item, error },
            Event::ProcessError { error } => return Self::ErrorEvent { error },
        };
        Self::DownloadEvent { event_type, item }
    }
}
