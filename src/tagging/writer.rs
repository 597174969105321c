//! ID3v2 tag writer
//!
//! Accumulates metadata field by field over a raw MPEG audio stream, then
//! finalizes into an immutable [`TaggedTrack`] with an ID3v2.4 tag prepended.
//!
//! Field rules:
//! - a field that was never set (or set to `None`, an empty string or an empty
//!   list) produces no frame at all
//! - setting a field again replaces the previous value
//! - numbers are written as ASCII text, as ID3v2 text frames require

use bytes::Bytes;
use lofty::config::WriteOptions;
use lofty::id3::v2::{
    AttachedPictureFrame, Frame, FrameId, Id3v2Tag, TextInformationFrame,
    UnsynchronizedTextFrame,
};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::*;
use lofty::TextEncoding;
use std::borrow::Cow;
use tracing::debug;

use crate::error::TagError;

/// Separator for multi-valued text frames (ID3v2.4)
const MULTI_VALUE_SEPARATOR: &str = "\0";

/// Album-level tag fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumTag {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub year: Option<u32>,
}

/// Lyrics tag fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricsTag {
    pub text: String,
    /// Content descriptor, usually the track title
    pub title: String,
    /// ISO 639-2 language code
    pub language: [u8; 3],
}

/// Complete set of metadata to embed in one track
///
/// Every field is optional; absent fields are never written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagSet {
    pub title: Option<String>,
    pub kind: Option<String>,
    pub duration_ms: Option<u64>,
    pub album: Option<AlbumTag>,
    pub genre: Option<String>,
    pub position: Option<u32>,
    pub volume: Option<u32>,
    pub labels: Option<Vec<String>>,
    pub artists: Option<Vec<String>>,
    pub cover: Option<Bytes>,
    pub lyrics: Option<LyricsTag>,
}

/// Builder that embeds a [`TagSet`] into an audio stream
#[derive(Debug, Clone)]
pub struct TagWriter {
    audio: Bytes,
    tags: TagSet,
}

impl TagWriter {
    /// Start tagging a raw audio stream
    pub fn new(audio: impl Into<Bytes>) -> Self {
        Self {
            audio: audio.into(),
            tags: TagSet::default(),
        }
    }

    /// Apply every present field of `tags`, leaving the others untouched
    pub fn apply(&mut self, tags: &TagSet) -> &mut Self {
        self.set_title(tags.title.as_deref())
            .set_type(tags.kind.as_deref())
            .set_duration(tags.duration_ms)
            .set_album(tags.album.clone())
            .set_genre(tags.genre.as_deref())
            .set_position_in_album(tags.position)
            .set_volume(tags.volume)
            .set_labels(tags.labels.iter().flatten().cloned())
            .set_artists(tags.artists.iter().flatten().cloned())
            .set_cover(tags.cover.clone())
            .set_lyric(tags.lyrics.clone())
    }

    pub fn set_title(&mut self, title: Option<&str>) -> &mut Self {
        if let Some(title) = present(title) {
            self.tags.title = Some(title);
        }
        self
    }

    /// Track kind, e.g. "music"
    pub fn set_type(&mut self, kind: Option<&str>) -> &mut Self {
        if let Some(kind) = present(kind) {
            self.tags.kind = Some(kind);
        }
        self
    }

    /// Duration in milliseconds
    pub fn set_duration(&mut self, duration_ms: Option<u64>) -> &mut Self {
        if duration_ms.is_some() {
            self.tags.duration_ms = duration_ms;
        }
        self
    }

    /// Album title, album artist and release year
    ///
    /// Empty strings inside the album are dropped; an album with nothing left is ignored.
    pub fn set_album(&mut self, album: Option<AlbumTag>) -> &mut Self {
        if let Some(album) = album {
            let album = AlbumTag {
                title: present(album.title.as_deref()),
                artist: present(album.artist.as_deref()),
                year: album.year,
            };
            if album != AlbumTag::default() {
                self.tags.album = Some(album);
            }
        }
        self
    }

    pub fn set_genre(&mut self, genre: Option<&str>) -> &mut Self {
        if let Some(genre) = present(genre) {
            self.tags.genre = Some(genre);
        }
        self
    }

    /// 1-based track number within its volume
    pub fn set_position_in_album(&mut self, position: Option<u32>) -> &mut Self {
        if position.is_some() {
            self.tags.position = position;
        }
        self
    }

    /// 1-based volume (disc) number
    pub fn set_volume(&mut self, volume: Option<u32>) -> &mut Self {
        if volume.is_some() {
            self.tags.volume = volume;
        }
        self
    }

    pub fn set_labels<I, S>(&mut self, labels: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(labels) = present_list(labels) {
            self.tags.labels = Some(labels);
        }
        self
    }

    pub fn set_artists<I, S>(&mut self, artists: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(artists) = present_list(artists) {
            self.tags.artists = Some(artists);
        }
        self
    }

    /// Lyrics; empty text is ignored
    pub fn set_lyric(&mut self, lyrics: Option<LyricsTag>) -> &mut Self {
        if let Some(lyrics) = lyrics.filter(|l| !l.text.trim().is_empty()) {
            self.tags.lyrics = Some(lyrics);
        }
        self
    }

    /// Front cover image (JPEG or PNG); empty data is ignored
    pub fn set_cover(&mut self, cover: Option<Bytes>) -> &mut Self {
        if let Some(cover) = cover.filter(|c| !c.is_empty()) {
            self.tags.cover = Some(cover);
        }
        self
    }

    /// Fields accumulated so far
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Produce the tagged stream
    ///
    /// Any ID3v2 tag already at the head of the input is replaced. If no field
    /// was set the audio is returned without a tag.
    pub fn finalize(self) -> Result<TaggedTrack, TagError> {
        let audio = strip_id3v2(&self.audio);
        let tag = build_tag(&self.tags);

        if tag.is_empty() {
            debug!("No tag fields set, passing {} bytes through", audio.len());
            return Ok(TaggedTrack { data: audio });
        }

        let mut out = Vec::with_capacity(audio.len() + 4096);
        tag.dump_to(&mut out, WriteOptions::default())?;
        let tag_len = out.len();
        out.extend_from_slice(&audio);

        debug!(
            "Wrote ID3v2 tag: {} frames, {} bytes ahead of {} bytes of audio",
            tag.len(),
            tag_len,
            audio.len()
        );

        Ok(TaggedTrack {
            data: Bytes::from(out),
        })
    }
}

/// Immutable tagged audio stream, ready to hand to storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedTrack {
    data: Bytes,
}

impl TaggedTrack {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Release the stream once storage is done with it
    ///
    /// Consumes `self`, so the tagged buffer is freed when this returns.
    pub fn revoke(self) {
        debug!("Released tagged stream ({} bytes)", self.data.len());
    }
}

fn build_tag(tags: &TagSet) -> Id3v2Tag {
    let mut tag = Id3v2Tag::new();

    if let Some(title) = &tags.title {
        tag.insert(text_frame("TIT2", title.clone()));
    }
    if let Some(kind) = &tags.kind {
        tag.insert(text_frame("TMED", kind.clone()));
    }
    if let Some(duration) = tags.duration_ms {
        tag.insert(text_frame("TLEN", duration.to_string()));
    }
    if let Some(album) = &tags.album {
        if let Some(title) = &album.title {
            tag.insert(text_frame("TALB", title.clone()));
        }
        if let Some(artist) = &album.artist {
            tag.insert(text_frame("TPE2", artist.clone()));
        }
        if let Some(year) = album.year {
            tag.insert(text_frame("TDRC", year.to_string()));
        }
    }
    if let Some(genre) = &tags.genre {
        tag.insert(text_frame("TCON", genre.clone()));
    }
    if let Some(position) = tags.position {
        tag.insert(text_frame("TRCK", position.to_string()));
    }
    if let Some(volume) = tags.volume {
        tag.insert(text_frame("TPOS", volume.to_string()));
    }
    if let Some(labels) = &tags.labels {
        tag.insert(text_frame("TPUB", labels.join(MULTI_VALUE_SEPARATOR)));
    }
    if let Some(artists) = &tags.artists {
        tag.insert(text_frame("TPE1", artists.join(MULTI_VALUE_SEPARATOR)));
    }
    if let Some(lyrics) = &tags.lyrics {
        tag.insert(Frame::UnsynchronizedText(UnsynchronizedTextFrame::new(
            TextEncoding::UTF8,
            lyrics.language,
            lyrics.title.clone(),
            lyrics.text.clone(),
        )));
    }
    if let Some(cover) = &tags.cover {
        let picture = Picture::new_unchecked(
            PictureType::CoverFront,
            sniff_mime(cover),
            None,
            cover.to_vec(),
        );
        tag.insert(Frame::Picture(AttachedPictureFrame::new(
            TextEncoding::UTF8,
            picture,
        )));
    }

    tag
}

fn text_frame(id: &'static str, value: String) -> Frame<'static> {
    Frame::Text(TextInformationFrame::new(
        FrameId::Valid(Cow::Borrowed(id)),
        TextEncoding::UTF8,
        value,
    ))
}

fn sniff_mime(image: &[u8]) -> Option<MimeType> {
    if image.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(MimeType::Jpeg)
    } else if image.starts_with(b"\x89PNG") {
        Some(MimeType::Png)
    } else {
        None
    }
}

/// Drop an ID3v2 tag at the head of the stream, if any
fn strip_id3v2(audio: &Bytes) -> Bytes {
    let len = existing_tag_len(audio);
    if len > 0 {
        debug!("Replacing existing {} byte ID3v2 tag", len);
    }
    audio.slice(len..)
}

fn existing_tag_len(data: &[u8]) -> usize {
    if data.len() < 10 || &data[..3] != b"ID3" {
        return 0;
    }

    let size_bytes = &data[6..10];
    if size_bytes.iter().any(|b| b & 0x80 != 0) {
        return 0;
    }

    // Synchsafe integer: 7 significant bits per byte
    let size = size_bytes
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | usize::from(*b));
    let footer = if data[5] & 0x10 != 0 { 10 } else { 0 };

    (10 + size + footer).min(data.len())
}

/// Map a language code to the 3-letter form USLT frames need
pub fn lyrics_language(code: Option<&str>) -> [u8; 3] {
    let code = code.map(|c| c.trim().to_ascii_lowercase()).unwrap_or_default();

    let three = match code.as_str() {
        c if c.len() == 3 && c.bytes().all(|b| b.is_ascii_lowercase()) => c,
        "en" => "eng",
        "ru" => "rus",
        "uk" => "ukr",
        "be" => "bel",
        "kk" => "kaz",
        "de" => "deu",
        "fr" => "fra",
        "es" => "spa",
        "it" => "ita",
        "pt" => "por",
        "ja" => "jpn",
        "ko" => "kor",
        "zh" => "zho",
        _ => "und",
    };

    let mut out = [0u8; 3];
    out.copy_from_slice(three.as_bytes());
    out
}

fn present(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn present_list<I, S>(values: I) -> Option<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let values: Vec<String> = values
        .into_iter()
        .map(Into::into)
        .filter(|v| !v.trim().is_empty())
        .collect();
    (!values.is_empty()).then_some(values)
}
