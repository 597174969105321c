//! Metadata embedding: ID3v2 tag writer and cover art processing

pub mod cover;
mod writer;

pub use cover::normalize_cover_art;
pub use writer::{lyrics_language, AlbumTag, LyricsTag, TagSet, TagWriter, TaggedTrack};
