//! Completion pipeline: tag the fetched audio and hand it to storage
//!
//! Runs after a successful fetch and before `complete` is emitted:
//! - resolve the track's metadata from the catalog (via the `trackId` custom data)
//! - fetch cover art and lyrics, degrading to a smaller tag set on failure
//! - write the ID3v2 tag (CPU-bound via spawn_blocking)
//! - persist at `destinationPath/filename`, then release the tagged stream

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

use super::item::{DownloadItem, ALBUM_ID_KEY, TRACK_ID_KEY};
use super::manager::CompletionHandler;
use crate::catalog::{Catalog, Track};
use crate::error::{DownloadError, TagError};
use crate::storage::StorageSink;
use crate::tagging::{lyrics_language, normalize_cover_art, AlbumTag, LyricsTag, TagSet, TagWriter};

/// Default [`CompletionHandler`] backed by the catalog and a storage sink
pub struct CompletionPipeline {
    catalog: Arc<dyn Catalog>,
    storage: Arc<dyn StorageSink>,
    cover_size: u32,
}

impl CompletionPipeline {
    pub fn new(catalog: Arc<dyn Catalog>, storage: Arc<dyn StorageSink>, cover_size: u32) -> Self {
        Self {
            catalog,
            storage,
            cover_size,
        }
    }

    /// Build the full tag set for an item, including cover and lyrics
    async fn resolve_tags(&self, item: &DownloadItem) -> Result<TagSet, DownloadError> {
        let Some(track_id) = item.custom(TRACK_ID_KEY) else {
            debug!(download_id = item.id.0, "No track id, storing untagged");
            return Ok(TagSet::default());
        };

        let track = self.catalog.track(track_id).await?;
        let mut tags = track_tags(&track, item.custom(ALBUM_ID_KEY));

        if let Some(uri) = &track.cover_uri {
            match self.catalog.cover(uri, self.cover_size).await {
                Ok(raw) => {
                    let max_size = self.cover_size;
                    let cover = tokio::task::spawn_blocking(move || normalize_cover_art(&raw, max_size))
                        .await
                        .map_err(TagError::from)?;
                    tags.cover = Some(Bytes::from(cover));
                }
                Err(e) => warn!("Failed to download cover art for {}: {}", track.title, e),
            }
        }

        if track.lyrics_available {
            match self.catalog.lyrics(&track.id).await {
                Ok(Some(lyrics)) => {
                    tags.lyrics = Some(LyricsTag {
                        text: lyrics.text,
                        title: track.full_title(),
                        language: lyrics_language(lyrics.language.as_deref()),
                    });
                }
                Ok(None) => debug!("No lyrics for {}", track.title),
                Err(e) => warn!("Failed to download lyrics for {}: {}", track.title, e),
            }
        }

        Ok(tags)
    }
}

#[async_trait]
impl CompletionHandler for CompletionPipeline {
    async fn complete(&self, item: &DownloadItem, audio: Bytes) -> Result<(), DownloadError> {
        let tags = self.resolve_tags(item).await?;

        let tagged = tokio::task::spawn_blocking(move || {
            let mut writer = TagWriter::new(audio);
            writer.apply(&tags);
            writer.finalize()
        })
        .await
        .map_err(TagError::from)??;

        let result = self.storage.save(&item.destination(), tagged.as_bytes()).await;
        tagged.revoke();
        result
    }
}

/// Tag fields derivable from catalog metadata alone
///
/// `album_id` picks which of the track's albums supplies album, position and
/// label fields; without it the first album is used.
pub fn track_tags(track: &Track, album_id: Option<&str>) -> TagSet {
    let album = track.album(album_id);
    let position = album.and_then(|a| a.track_position);

    TagSet {
        title: Some(track.full_title()),
        kind: track.kind.clone(),
        duration_ms: track.duration_ms,
        album: album.map(|a| AlbumTag {
            title: Some(a.title.clone()),
            artist: Some(
                a.artists
                    .iter()
                    .map(|artist| artist.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            year: a.year,
        }),
        genre: album.and_then(|a| a.genre.clone()),
        position: position.map(|p| p.index),
        volume: position.map(|p| p.volume),
        labels: album.map(|a| a.labels.clone()),
        artists: Some(track.artists.iter().map(|a| a.name.clone()).collect()),
        cover: None,
        lyrics: None,
    }
}
