//! tunegrab - download tracks, albums, playlists and artists from a music
//! catalog, with metadata embedded in every file
//!
//! The core is [`download::DownloadManager`], a bounded-concurrency queue that
//! fetches audio, tags it through [`tagging::TagWriter`] and hands it to a
//! [`storage::StorageSink`], announcing every lifecycle step on its
//! [`download::EventBus`].

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod relay;
pub mod storage;
pub mod tagging;
pub mod utils;
