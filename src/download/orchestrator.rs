//! Turns catalog entities into download requests
//!
//! Each requested track/album/playlist/artist is resolved through the catalog,
//! unavailable tracks are skipped, and every remaining track gets its own
//! download link lookup in an independent task. A failed lookup is reported on
//! the process error channel and never affects the rest of the batch.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::item::{DownloadId, DownloadRequest, ALBUM_ID_KEY, TRACK_ID_KEY};
use super::manager::DownloadManager;
use crate::catalog::{Album, Catalog, Track};
use crate::config::{FolderSettings, Settings};
use crate::error::CatalogError;
use crate::utils::{render_filename, sanitize_filename, TemplateValues};

/// Outcome of resolving one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Ids of the items that were queued, in catalog order
    pub enqueued: Vec<DownloadId>,
    /// Tracks the catalog marked unavailable
    pub skipped: usize,
    /// Tracks that could not be resolved or queued
    pub failed: usize,
}

impl BatchSummary {
    fn merge(&mut self, other: BatchSummary) {
        self.enqueued.extend(other.enqueued);
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// A track together with where it should land
struct PlannedTrack {
    track: Track,
    album_title: String,
    album_id: Option<String>,
    directory: PathBuf,
}

/// Resolves catalog entities and feeds the download manager
#[derive(Clone)]
pub struct Orchestrator {
    catalog: Arc<dyn Catalog>,
    manager: DownloadManager,
    settings: Arc<Settings>,
}

impl Orchestrator {
    pub fn new(catalog: Arc<dyn Catalog>, manager: DownloadManager, settings: Settings) -> Self {
        Self {
            catalog,
            manager,
            settings: Arc::new(settings),
        }
    }

    pub fn manager(&self) -> &DownloadManager {
        &self.manager
    }

    /// Queue a single track into the output root
    pub async fn download_track(&self, track_id: &str) -> Result<BatchSummary, CatalogError> {
        let track = self.catalog.track(track_id).await?;
        info!("Downloading track: {}", track.full_title());

        let album_title = track
            .album(None)
            .map(|album| album.title.clone())
            .unwrap_or_default();
        let planned = PlannedTrack {
            track,
            album_title,
            album_id: None,
            directory: self.settings.output_path.clone(),
        };

        Ok(self.enqueue_all(vec![planned]).await)
    }

    /// Queue every available track of an album
    pub async fn download_album(&self, album_id: &str) -> Result<BatchSummary, CatalogError> {
        let album = self.catalog.album(album_id).await?;
        info!(
            "Downloading album: {} - {} ({} tracks)",
            album.artist_names(),
            album.title,
            album.track_count()
        );

        let multi_volume = album.volumes.len() > 1;
        let mut planned = Vec::with_capacity(album.track_count());
        for (volume_index, volume) in album.volumes.iter().enumerate() {
            let volume_number = multi_volume.then_some(volume_index + 1);
            let directory =
                album_directory(&self.settings.output_path, &self.settings.folders, &album, volume_number);

            for track in volume {
                planned.push(PlannedTrack {
                    track: track.clone(),
                    album_title: album.title.clone(),
                    album_id: Some(album.id.clone()),
                    directory: directory.clone(),
                });
            }
        }

        Ok(self.enqueue_all(planned).await)
    }

    /// Queue every available track of a user playlist
    pub async fn download_playlist(
        &self,
        owner: &str,
        kind: &str,
    ) -> Result<BatchSummary, CatalogError> {
        let playlist = self.catalog.playlist(owner, kind).await?;
        info!(
            "Downloading playlist: {} ({} tracks)",
            playlist.title,
            playlist.tracks.len()
        );

        let mut directory = self.settings.output_path.clone();
        if self.settings.folders.playlist {
            directory.push(folder_name(&playlist.title));
        }

        let planned = playlist
            .tracks
            .into_iter()
            .map(|track| PlannedTrack {
                album_title: track
                    .album(None)
                    .map(|album| album.title.clone())
                    .unwrap_or_default(),
                album_id: None,
                directory: directory.clone(),
                track,
            })
            .collect();

        Ok(self.enqueue_all(planned).await)
    }

    /// Queue every album of an artist
    ///
    /// A failing album is reported on the process error channel; the other
    /// albums still go ahead.
    pub async fn download_artist(&self, artist_id: &str) -> Result<BatchSummary, CatalogError> {
        let catalog = self.catalog.artist(artist_id).await?;
        info!(
            "Downloading artist: {} ({} albums)",
            catalog.artist.name,
            catalog.albums.len()
        );

        let mut summary = BatchSummary::default();
        for album in &catalog.albums {
            match self.download_album(&album.id).await {
                Ok(album_summary) => summary.merge(album_summary),
                Err(e) => {
                    warn!("Failed to resolve album {}: {}", album.title, e);
                    self.manager
                        .bus()
                        .publish_process_error(format!("album {}: {}", album.title, e));
                }
            }
        }
        Ok(summary)
    }

    /// Resolve download links concurrently, then queue in catalog order
    async fn enqueue_all(&self, planned: Vec<PlannedTrack>) -> BatchSummary {
        let mut summary = BatchSummary::default();

        let mut tasks = Vec::with_capacity(planned.len());
        for plan in planned {
            if !plan.track.available {
                debug!("Skipping unavailable track: {}", plan.track.title);
                summary.skipped += 1;
                continue;
            }

            let orchestrator = self.clone();
            let title = plan.track.full_title();
            tasks.push((
                title,
                tokio::spawn(async move { orchestrator.build_request(plan).await }),
            ));
        }

        let (titles, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        for (title, joined) in titles.into_iter().zip(join_all(handles).await) {
            let request = match joined {
                Ok(Ok(request)) => request,
                Ok(Err(e)) => {
                    self.report_failure(&title, &e);
                    summary.failed += 1;
                    continue;
                }
                Err(e) => {
                    self.report_failure(&title, &e);
                    summary.failed += 1;
                    continue;
                }
            };

            match self.manager.enqueue(request) {
                Ok(id) => summary.enqueued.push(id),
                Err(e) => {
                    self.report_failure(&title, &e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Queued {} tracks ({} skipped, {} failed)",
            summary.enqueued.len(),
            summary.skipped,
            summary.failed
        );
        summary
    }

    async fn build_request(&self, plan: PlannedTrack) -> Result<DownloadRequest, CatalogError> {
        let link = self.catalog.download_link(&plan.track.id).await?;

        let title = plan.track.full_title();
        let artist = plan.track.artist_names();
        let name = render_filename(
            &self.settings.filename_template,
            &TemplateValues {
                title: &title,
                album: &plan.album_title,
                artist: &artist,
            },
        );

        let mut custom_data = BTreeMap::from([(TRACK_ID_KEY.to_string(), plan.track.id.clone())]);
        if let Some(album_id) = plan.album_id {
            custom_data.insert(ALBUM_ID_KEY.to_string(), album_id);
        }

        Ok(DownloadRequest {
            source_url: link.url,
            title,
            filename: format!("{name}.mp3"),
            destination_path: plan.directory,
            custom_data,
        })
    }

    fn report_failure(&self, title: &str, error: &dyn std::fmt::Display) {
        warn!("Failed to queue {}: {}", title, error);
        self.manager
            .bus()
            .publish_process_error(format!("{title}: {error}"));
    }
}

/// `root/[artist]/[album]/[CD<n>]`, each level subject to its folder toggle
fn album_directory(
    root: &Path,
    folders: &FolderSettings,
    album: &Album,
    volume: Option<usize>,
) -> PathBuf {
    let mut directory = root.to_path_buf();
    if folders.artist {
        directory.push(folder_name(&album.artist_names()));
    }
    if folders.album {
        directory.push(folder_name(&album.title));
    }
    if let Some(volume) = volume.filter(|_| folders.volume) {
        directory.push(format!("CD{volume}"));
    }
    directory
}

fn folder_name(name: &str) -> String {
    let name = sanitize_filename(name);
    if name.is_empty() {
        "Unknown".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::events::{Event, Topic};
    use crate::download::item::{DownloadItem, DownloadState};
    use crate::download::test_helpers::{
        album, album_track, artist_catalog, FakeCatalog, GatedFetcher, RecordingCompletion,
    };
    use crate::catalog::Playlist;

    fn settings() -> Settings {
        Settings {
            output_path: PathBuf::from("/music"),
            ..Settings::default()
        }
    }

    fn orchestrator(catalog: FakeCatalog, settings: Settings) -> Orchestrator {
        let manager = DownloadManager::new(
            2,
            Arc::new(GatedFetcher::new()),
            Arc::new(RecordingCompletion::default()),
        );
        Orchestrator::new(Arc::new(catalog), manager, settings)
    }

    fn two_volume_album() -> Album {
        let mut hidden = album_track("t2", "Hidden", "rec", 1, 2);
        hidden.available = false;
        album(
            "rec",
            vec![
                vec![album_track("t1", "Opening", "rec", 1, 1), hidden],
                vec![
                    album_track("t3", "Second: Side", "rec", 2, 1),
                    album_track("t4", "Closing", "rec", 2, 2),
                ],
            ],
        )
    }

    fn items(orchestrator: &Orchestrator) -> Vec<DownloadItem> {
        orchestrator.manager().list()
    }

    #[tokio::test]
    async fn test_album_skips_unavailable_and_nests_volumes() {
        let catalog = FakeCatalog::default().with_album(two_volume_album());
        let orchestrator = orchestrator(catalog, settings());
        let mut errors = orchestrator.manager().bus().subscribe(Topic::ProcessError);

        let summary = orchestrator.download_album("rec").await.unwrap();

        assert_eq!(summary.enqueued.len(), 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert!(errors.events.try_recv().is_err());

        let items = items(&orchestrator);
        let placed: Vec<(PathBuf, &str)> = items
            .iter()
            .map(|item| (item.destination_path.clone(), item.filename.as_str()))
            .collect();
        assert_eq!(
            placed,
            vec![
                (PathBuf::from("/music/Band/Record/CD1"), "Band - Opening.mp3"),
                (PathBuf::from("/music/Band/Record/CD2"), "Band - Second%3A Side.mp3"),
                (PathBuf::from("/music/Band/Record/CD2"), "Band - Closing.mp3"),
            ]
        );
        assert!(items.iter().all(|item| item.custom(ALBUM_ID_KEY) == Some("rec")));
        assert_eq!(items[0].custom(TRACK_ID_KEY), Some("t1"));
    }

    #[tokio::test]
    async fn test_unavailable_track_never_resolved() {
        let catalog = Arc::new(FakeCatalog::default().with_album(two_volume_album()));
        let manager = DownloadManager::new(
            1,
            Arc::new(GatedFetcher::new()),
            Arc::new(RecordingCompletion::default()),
        );
        let orchestrator = Orchestrator::new(catalog.clone(), manager, settings());

        orchestrator.download_album("rec").await.unwrap();

        assert_eq!(catalog.link_requests(), vec!["t1", "t3", "t4"]);
    }

    #[tokio::test]
    async fn test_link_failure_is_isolated() {
        let mut catalog = FakeCatalog::default().with_album(two_volume_album());
        catalog.broken_links.insert("t3".to_string());
        let orchestrator = orchestrator(catalog, settings());
        let mut errors = orchestrator.manager().bus().subscribe(Topic::ProcessError);

        let summary = orchestrator.download_album("rec").await.unwrap();

        assert_eq!(summary.enqueued.len(), 2);
        assert_eq!(summary.failed, 1);
        match errors.recv().await {
            Some(Event::ProcessError { error }) => assert!(error.contains("Second: Side"), "{error}"),
            other => panic!("expected process error, got {other:?}"),
        }

        let titles: Vec<String> = items(&orchestrator).into_iter().map(|i| i.title).collect();
        assert_eq!(titles, vec!["Opening", "Closing"]);
    }

    #[tokio::test]
    async fn test_single_volume_album_has_no_cd_folder() {
        let catalog = FakeCatalog::default().with_album(album(
            "solo",
            vec![vec![album_track("t1", "Only", "solo", 1, 1)]],
        ));
        let orchestrator = orchestrator(catalog, settings());

        orchestrator.download_album("solo").await.unwrap();

        assert_eq!(
            items(&orchestrator)[0].destination_path,
            PathBuf::from("/music/Band/Record")
        );
    }

    #[tokio::test]
    async fn test_folder_toggles_disabled() {
        let catalog = FakeCatalog::default().with_album(two_volume_album());
        let mut settings = settings();
        settings.folders = FolderSettings {
            artist: false,
            album: false,
            volume: false,
            playlist: false,
        };
        settings.filename_template = "{album} - {title}".to_string();
        let orchestrator = orchestrator(catalog, settings);

        orchestrator.download_album("rec").await.unwrap();

        let items = items(&orchestrator);
        assert!(items.iter().all(|i| i.destination_path == PathBuf::from("/music")));
        assert_eq!(items[0].filename, "Record - Opening.mp3");
    }

    #[tokio::test]
    async fn test_playlist_folder() {
        let mut catalog = FakeCatalog::default();
        catalog.playlists.insert(
            ("alice".to_string(), "3".to_string()),
            Playlist {
                owner: "alice".into(),
                kind: "3".into(),
                title: "Road/Trip".into(),
                tracks: vec![album_track("t1", "Drive", "rec", 1, 1)],
            },
        );
        let orchestrator = orchestrator(catalog, settings());

        let summary = orchestrator.download_playlist("alice", "3").await.unwrap();

        assert_eq!(summary.enqueued.len(), 1);
        let item = &items(&orchestrator)[0];
        assert_eq!(item.destination_path, PathBuf::from("/music/Road%2FTrip"));
        assert_eq!(item.custom(ALBUM_ID_KEY), None);
    }

    #[tokio::test]
    async fn test_dot_playlist_title_stays_under_output_root() {
        let mut catalog = FakeCatalog::default();
        catalog.playlists.insert(
            ("alice".to_string(), "4".to_string()),
            Playlist {
                owner: "alice".into(),
                kind: "4".into(),
                title: "..".into(),
                tracks: vec![album_track("t1", "Drive", "rec", 1, 1)],
            },
        );
        let settings = Settings {
            output_path: PathBuf::from("/music/tunegrab"),
            ..Settings::default()
        };
        let orchestrator = orchestrator(catalog, settings);

        orchestrator.download_playlist("alice", "4").await.unwrap();

        let destination = items(&orchestrator)[0].destination();
        assert_eq!(
            destination,
            PathBuf::from("/music/tunegrab/%2E%2E/Band - Drive.mp3")
        );
        assert!(destination
            .components()
            .all(|c| !matches!(c, std::path::Component::ParentDir | std::path::Component::CurDir)));
    }

    #[tokio::test]
    async fn test_single_track_goes_to_output_root() {
        let catalog = FakeCatalog::default().with_track(album_track("t9", "Alone", "rec", 1, 1));
        let orchestrator = orchestrator(catalog, settings());

        let summary = orchestrator.download_track("t9").await.unwrap();

        let item = orchestrator.manager().get(summary.enqueued[0]).unwrap();
        assert_eq!(item.destination(), PathBuf::from("/music/Band - Alone.mp3"));
        assert_eq!(item.state, DownloadState::Active);
    }

    #[tokio::test]
    async fn test_unknown_track_is_batch_error() {
        let orchestrator = orchestrator(FakeCatalog::default(), settings());
        let err = orchestrator.download_track("missing").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
        assert!(items(&orchestrator).is_empty());
    }

    #[tokio::test]
    async fn test_artist_continues_past_missing_album() {
        let mut catalog = FakeCatalog::default().with_album(two_volume_album());
        let mut ghost = album("ghost", Vec::new());
        ghost.title = "Ghost".into();
        catalog.artists.insert(
            "band".to_string(),
            artist_catalog("band", "Band", vec![ghost, album("rec", Vec::new())]),
        );
        let orchestrator = orchestrator(catalog, settings());
        let mut errors = orchestrator.manager().bus().subscribe(Topic::ProcessError);

        let summary = orchestrator.download_artist("band").await.unwrap();

        assert_eq!(summary.enqueued.len(), 3);
        match errors.recv().await {
            Some(Event::ProcessError { error }) => assert!(error.contains("Ghost"), "{error}"),
            other => panic!("expected process error, got {other:?}"),
        }
    }
}
