//! Catalog API response models

use serde::{Deserialize, Serialize};

/// Wrapper for all catalog API responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub result: Option<T>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub name: String,
    #[serde(default)]
    pub message: String,
}

/// Artist reference embedded in tracks and albums
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
}

/// Position of a track inside one album
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackPosition {
    /// 1-based volume (disc) number
    pub volume: u32,
    /// 1-based index within the volume
    pub index: u32,
}

/// Album a track appears on, as seen from the track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumRef {
    pub id: String,
    pub title: String,
    pub year: Option<u32>,
    pub genre: Option<String>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub track_position: Option<TrackPosition>,
}

/// Track from the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub title: String,
    pub version: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub albums: Vec<AlbumRef>,
    pub cover_uri: Option<String>,
    #[serde(default)]
    pub lyrics_available: bool,
    /// Track kind as reported by the catalog, e.g. "music" or "podcast-episode"
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

fn default_available() -> bool {
    true
}

impl Track {
    /// Title including the version suffix, e.g. "Song (Live)"
    pub fn full_title(&self) -> String {
        match self.version.as_deref().map(str::trim) {
            Some(version) if !version.is_empty() => format!("{} ({})", self.title, version),
            _ => self.title.clone(),
        }
    }

    /// Artist names joined for display
    pub fn artist_names(&self) -> String {
        join_artists(&self.artists)
    }

    /// Album context for this track, preferring `album_id` when present
    pub fn album(&self, album_id: Option<&str>) -> Option<&AlbumRef> {
        album_id
            .and_then(|id| self.albums.iter().find(|album| album.id == id))
            .or_else(|| self.albums.first())
    }
}

/// Album with its tracks grouped by volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub title: String,
    pub year: Option<u32>,
    pub genre: Option<String>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub cover_uri: Option<String>,
    #[serde(default)]
    pub volumes: Vec<Vec<Track>>,
}

impl Album {
    /// Artist names joined for display
    pub fn artist_names(&self) -> String {
        join_artists(&self.artists)
    }

    /// Total number of tracks across all volumes
    pub fn track_count(&self) -> usize {
        self.volumes.iter().map(Vec::len).sum()
    }
}

/// User playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub owner: String,
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

/// Artist from the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

/// Artist with their albums (album volumes are not populated here)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistCatalog {
    pub artist: Artist,
    #[serde(default)]
    pub albums: Vec<Album>,
}

/// Synchronized or plain lyrics for a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lyrics {
    pub text: String,
    /// Language code, ISO 639-1 or 639-2
    pub language: Option<String>,
}

/// Resolved download link for a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadLink {
    pub url: String,
}

fn join_artists(artists: &[ArtistRef]) -> String {
    artists
        .iter()
        .map(|artist| artist.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
