//! Settings persistence
//!
//! Stores download preferences in ~/.config/tunegrab/settings.json.
//! A missing file means defaults; CLI flags override whatever is loaded.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::utils::DEFAULT_TEMPLATE;

/// Default number of simultaneous downloads
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default edge length of embedded cover art in pixels
pub const DEFAULT_COVER_SIZE: u32 = 1000;

/// Download settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Maximum number of simultaneously active downloads
    pub concurrency: usize,
    /// Filename template with `{title}`, `{album}` and `{artist}` tokens
    pub filename_template: String,
    /// Root directory downloads are written under
    pub output_path: PathBuf,
    /// Which nested folders to create
    pub folders: FolderSettings,
    /// Base URL of the catalog API
    pub catalog_url: String,
    /// Maximum width/height of embedded cover art
    pub cover_size: u32,
}

/// Per-category folder toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderSettings {
    /// Nest album and artist downloads under an artist folder
    pub artist: bool,
    /// Nest album and artist downloads under an album folder
    pub album: bool,
    /// Nest multi-volume albums under `CD<n>` folders
    pub volume: bool,
    /// Nest playlist downloads under a playlist folder
    pub playlist: bool,
}

impl Default for FolderSettings {
    fn default() -> Self {
        Self {
            artist: true,
            album: true,
            volume: true,
            playlist: true,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        let output_path = dirs::audio_dir()
            .map(|dir| dir.join("tunegrab"))
            .unwrap_or_else(|| PathBuf::from("downloads"));

        Self {
            concurrency: DEFAULT_CONCURRENCY,
            filename_template: DEFAULT_TEMPLATE.to_string(),
            output_path,
            folders: FolderSettings::default(),
            catalog_url: "http://localhost:8080/api".to_string(),
            cover_size: DEFAULT_COVER_SIZE,
        }
    }
}

impl Settings {
    /// Load settings from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load settings from a specific file, falling back to defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;

        let settings: Self =
            serde_json::from_str(&contents).with_context(|| "Failed to parse settings")?;

        debug!("Loaded settings from {}", path.display());
        Ok(settings.normalized())
    }

    /// Save settings to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize settings")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write settings to {:?}", path))?;

        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Get the settings file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("tunegrab").join("settings.json"))
    }

    /// Clamp values that would make the scheduler or templating misbehave
    pub fn normalized(mut self) -> Self {
        self.concurrency = self.concurrency.max(1);
        if self.filename_template.trim().is_empty() {
            self.filename_template = DEFAULT_TEMPLATE.to_string();
        }
        if self.cover_size == 0 {
            self.cover_size = DEFAULT_COVER_SIZE;
        }
        self
    }
}
