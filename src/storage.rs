//! Persistence of finished tracks

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::DownloadError;

/// Host-provided "save bytes at path" capability
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Persist `data` at `path`, creating parent directories as needed
    async fn save(&self, path: &Path, data: &[u8]) -> Result<(), DownloadError>;
}

/// Writes tracks to the local filesystem
///
/// Relative paths are resolved against `root`.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Create a new storage sink rooted at `root`
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl StorageSink for FsStorage {
    async fn save(&self, path: &Path, data: &[u8]) -> Result<(), DownloadError> {
        let file_path = self.resolve(path);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                DownloadError::Transport(format!(
                    "failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        // The target path only ever holds a complete file
        let partial = partial_path(&file_path);
        if let Err(e) = fs::write(&partial, data).await {
            discard(&partial).await;
            return Err(DownloadError::Transport(format!(
                "failed to write {}: {}",
                partial.display(),
                e
            )));
        }
        if let Err(e) = fs::rename(&partial, &file_path).await {
            discard(&partial).await;
            return Err(DownloadError::Transport(format!(
                "failed to move {}: {}",
                file_path.display(),
                e
            )));
        }

        debug!("Wrote track: {} ({} bytes)", file_path.display(), data.len());
        Ok(())
    }
}

/// `song.mp3` is staged as `song.mp3.part`
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

async fn discard(partial: &Path) {
    if let Err(e) = fs::remove_file(partial).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", partial.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path().to_path_buf());

        storage
            .save(Path::new("Artist/Album/01 - Song.mp3"), b"data")
            .await
            .unwrap();

        let written = dir.path().join("Artist/Album/01 - Song.mp3");
        assert_eq!(std::fs::read(&written).unwrap(), b"data");
        assert!(!dir.path().join("Artist/Album/01 - Song.mp3.part").exists());
    }

    #[tokio::test]
    async fn test_absolute_path_ignores_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(PathBuf::from("/nonexistent-root"));
        let target = dir.path().join("song.mp3");

        storage.save(&target, b"abc").await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_unwritable_path_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let storage = FsStorage::new(dir.path().to_path_buf());

        let err = storage
            .save(Path::new("file/inside/song.mp3"), b"abc")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Transport(_)));
    }

    #[test]
    fn test_partial_keeps_extension() {
        assert_eq!(
            partial_path(Path::new("Band/Song.mp3")),
            PathBuf::from("Band/Song.mp3.part")
        );
        assert_ne!(
            partial_path(Path::new("Band/Song.mp3")),
            partial_path(Path::new("Band/Song.flac"))
        );
    }

    #[tokio::test]
    async fn test_failed_move_leaves_no_partial() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the target makes the rename fail
        let target = dir.path().join("Song.mp3");
        std::fs::create_dir_all(target.join("occupied")).unwrap();
        let storage = FsStorage::new(dir.path().to_path_buf());

        let err = storage.save(Path::new("Song.mp3"), b"abc").await.unwrap_err();

        assert!(matches!(err, DownloadError::Transport(_)));
        assert!(!dir.path().join("Song.mp3.part").exists());
    }
}
