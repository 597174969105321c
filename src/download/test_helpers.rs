//! Shared fakes for download manager, pipeline and orchestrator tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;

use super::fetch::{Fetcher, ProgressSink};
use super::item::{DownloadId, DownloadItem, DownloadRequest, TRACK_ID_KEY};
use super::manager::CompletionHandler;
use crate::catalog::{
    Album, AlbumRef, Artist, ArtistCatalog, ArtistRef, Catalog, DownloadLink, Lyrics, Playlist,
    Track, TrackPosition,
};
use crate::error::{CatalogError, DownloadError};
use crate::storage::StorageSink;

/// A valid request for a track called `name`
pub(crate) fn request(name: &str) -> DownloadRequest {
    DownloadRequest {
        source_url: format!("https://cdn.test/{name}.mp3"),
        title: name.to_string(),
        filename: format!("{name}.mp3"),
        destination_path: PathBuf::from("out"),
        custom_data: BTreeMap::from([(TRACK_ID_KEY.to_string(), name.to_string())]),
    }
}

/// A few silent MPEG-1 Layer III frames (128 kbps, 44.1 kHz)
pub(crate) fn silent_mp3() -> Bytes {
    let mut data = Vec::new();
    for _ in 0..8 {
        let mut frame = vec![0u8; 417];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
        data.extend_from_slice(&frame);
    }
    Bytes::from(data)
}

/// Fetcher that blocks every transfer until the test releases it
///
/// Each fetch reports one progress update, then waits for a permit. URLs
/// containing the failure marker fail with a transport error, URLs containing
/// the cut marker end with a transport-level interruption.
pub(crate) struct GatedFetcher {
    gate: Semaphore,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    fail_marker: Option<&'static str>,
    cut_marker: Option<&'static str>,
}

impl GatedFetcher {
    pub(crate) fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            fail_marker: None,
            cut_marker: None,
        }
    }

    pub(crate) fn failing_on(marker: &'static str) -> Self {
        Self {
            fail_marker: Some(marker),
            ..Self::new()
        }
    }

    pub(crate) fn cancelled_on(marker: &'static str) -> Self {
        Self {
            cut_marker: Some(marker),
            ..Self::new()
        }
    }

    /// Let `n` more transfers finish
    pub(crate) fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Highest number of transfers seen in flight at once
    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for GatedFetcher {
    async fn fetch(&self, url: &str, progress: &dyn ProgressSink) -> Result<Bytes, DownloadError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak.fetch_max(now, Ordering::SeqCst);

        let audio = silent_mp3();
        progress.report(1, Some(audio.len() as u64));

        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| DownloadError::Transport(e.to_string()))?;
        permit.forget();

        if self.fail_marker.is_some_and(|m| url.contains(m)) {
            return Err(DownloadError::Transport("connection reset".into()));
        }
        if self.cut_marker.is_some_and(|m| url.contains(m)) {
            return Err(DownloadError::Cancelled);
        }

        progress.report(audio.len() as u64, Some(audio.len() as u64));
        Ok(audio)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum CompletionMode {
    #[default]
    Succeed,
    Fail,
    Panic,
}

/// Completion handler that records which items it saw
#[derive(Default)]
pub(crate) struct RecordingCompletion {
    mode: CompletionMode,
    completed: Mutex<Vec<DownloadId>>,
}

impl RecordingCompletion {
    pub(crate) fn failing() -> Self {
        Self {
            mode: CompletionMode::Fail,
            ..Self::default()
        }
    }

    pub(crate) fn panicking() -> Self {
        Self {
            mode: CompletionMode::Panic,
            ..Self::default()
        }
    }

    pub(crate) fn completed(&self) -> Vec<DownloadId> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionHandler for RecordingCompletion {
    async fn complete(&self, item: &DownloadItem, _audio: Bytes) -> Result<(), DownloadError> {
        match self.mode {
            CompletionMode::Succeed => {
                self.completed.lock().unwrap().push(item.id);
                Ok(())
            }
            CompletionMode::Fail => Err(DownloadError::Transport("disk full".into())),
            CompletionMode::Panic => panic!("completion exploded"),
        }
    }
}

/// Storage that keeps written files in memory
#[derive(Default)]
pub(crate) struct MemoryStorage {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryStorage {
    pub(crate) fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path.as_ref()).cloned()
    }

    pub(crate) fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.files.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl StorageSink for MemoryStorage {
    async fn save(&self, path: &Path, data: &[u8]) -> Result<(), DownloadError> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }
}

/// In-memory catalog
#[derive(Default)]
pub(crate) struct FakeCatalog {
    pub(crate) tracks: HashMap<String, Track>,
    pub(crate) albums: HashMap<String, Album>,
    pub(crate) playlists: HashMap<(String, String), Playlist>,
    pub(crate) artists: HashMap<String, ArtistCatalog>,
    pub(crate) lyrics: HashMap<String, Lyrics>,
    pub(crate) covers: HashMap<String, Bytes>,
    /// Track ids whose download link cannot be resolved
    pub(crate) broken_links: HashSet<String>,
    link_log: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub(crate) fn with_track(mut self, track: Track) -> Self {
        self.tracks.insert(track.id.clone(), track);
        self
    }

    pub(crate) fn with_album(mut self, album: Album) -> Self {
        for track in album.volumes.iter().flatten() {
            self.tracks.insert(track.id.clone(), track.clone());
        }
        self.albums.insert(album.id.clone(), album);
        self
    }

    pub(crate) fn link_requests(&self) -> Vec<String> {
        let mut requests = self.link_log.lock().unwrap().clone();
        requests.sort();
        requests
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn track(&self, id: &str) -> Result<Track, CatalogError> {
        self.tracks
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("track {id}")))
    }

    async fn album(&self, id: &str) -> Result<Album, CatalogError> {
        self.albums
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("album {id}")))
    }

    async fn playlist(&self, owner: &str, kind: &str) -> Result<Playlist, CatalogError> {
        self.playlists
            .get(&(owner.to_string(), kind.to_string()))
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("playlist {owner}/{kind}")))
    }

    async fn artist(&self, id: &str) -> Result<ArtistCatalog, CatalogError> {
        self.artists
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("artist {id}")))
    }

    async fn download_link(&self, track_id: &str) -> Result<DownloadLink, CatalogError> {
        self.link_log.lock().unwrap().push(track_id.to_string());
        if self.broken_links.contains(track_id) {
            return Err(CatalogError::Api {
                name: "no-rights".into(),
                message: format!("track {track_id} cannot be downloaded"),
            });
        }
        Ok(DownloadLink {
            url: format!("https://cdn.test/{track_id}.mp3"),
        })
    }

    async fn lyrics(&self, track_id: &str) -> Result<Option<Lyrics>, CatalogError> {
        Ok(self.lyrics.get(track_id).cloned())
    }

    async fn cover(&self, uri: &str, _size: u32) -> Result<Bytes, CatalogError> {
        self.covers
            .get(uri)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("cover {uri}")))
    }
}

pub(crate) fn artist(id: &str, name: &str) -> ArtistRef {
    ArtistRef {
        id: id.to_string(),
        name: name.to_string(),
    }
}

/// Track `id` by "Band", placed at `volume`/`index` of album `album_id`
pub(crate) fn album_track(id: &str, title: &str, album_id: &str, volume: u32, index: u32) -> Track {
    Track {
        id: id.to_string(),
        title: title.to_string(),
        version: None,
        available: true,
        duration_ms: Some(180_000),
        artists: vec![artist("band", "Band")],
        albums: vec![AlbumRef {
            id: album_id.to_string(),
            title: "Record".to_string(),
            year: Some(2001),
            genre: Some("rock".to_string()),
            artists: vec![artist("band", "Band")],
            labels: vec!["Label".to_string()],
            track_position: Some(TrackPosition { volume, index }),
        }],
        cover_uri: None,
        lyrics_available: false,
        kind: Some("music".to_string()),
    }
}

/// Album "Record" by "Band" with the given volumes
pub(crate) fn album(id: &str, volumes: Vec<Vec<Track>>) -> Album {
    Album {
        id: id.to_string(),
        title: "Record".to_string(),
        year: Some(2001),
        genre: Some("rock".to_string()),
        artists: vec![artist("band", "Band")],
        labels: vec!["Label".to_string()],
        cover_uri: None,
        volumes,
    }
}

pub(crate) fn artist_catalog(id: &str, name: &str, albums: Vec<Album>) -> ArtistCatalog {
    ArtistCatalog {
        artist: Artist {
            id: id.to_string(),
            name: name.to_string(),
        },
        albums,
    }
}
