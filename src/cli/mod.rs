//! CLI module for tunegrab

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tunegrab::config::Settings;

pub mod commands;
mod progress;

#[derive(Parser, Debug)]
#[command(name = "tunegrab", about = "Download music with embedded metadata")]
#[command(version, author)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Catalog API base URL
    #[arg(long, global = true, env = "TUNEGRAB_CATALOG_URL")]
    pub catalog_url: Option<String>,

    /// Directory downloads are written to
    #[arg(short, long, global = true, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Number of parallel downloads
    #[arg(short, long, global = true)]
    pub parallel: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download a single track
    Track {
        /// Catalog track id
        track_id: String,
    },

    /// Download every available track of an album
    Album {
        /// Catalog album id
        album_id: String,
    },

    /// Download a user playlist
    Playlist {
        /// Playlist owner (user login or id)
        owner: String,

        /// Playlist kind within the owner's library
        kind: String,
    },

    /// Download every album of an artist
    Artist {
        /// Catalog artist id
        artist_id: String,
    },

    /// Relay JSON-lines commands and events over stdin/stdout
    Serve,

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

impl Cli {
    /// Apply command line overrides on top of loaded settings
    pub fn apply_overrides(&self, mut settings: Settings) -> Settings {
        if let Some(url) = &self.catalog_url {
            settings.catalog_url = url.clone();
        }
        if let Some(output) = &self.output {
            settings.output_path = output.clone();
        }
        if let Some(parallel) = self.parallel {
            settings.concurrency = parallel;
        }
        settings.normalized()
    }
}
