//! Catalog API HTTP client

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::models::*;
use crate::error::CatalogError;

/// Read-only view of the remote music catalog
///
/// The download pipeline only ever talks to the catalog through this trait.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Get a single track with its album context
    async fn track(&self, id: &str) -> Result<Track, CatalogError>;

    /// Get an album with its tracks grouped by volume
    async fn album(&self, id: &str) -> Result<Album, CatalogError>;

    /// Get a user playlist with its tracks
    async fn playlist(&self, owner: &str, kind: &str) -> Result<Playlist, CatalogError>;

    /// Get an artist with their albums
    async fn artist(&self, id: &str) -> Result<ArtistCatalog, CatalogError>;

    /// Resolve the direct audio URL for a track
    async fn download_link(&self, track_id: &str) -> Result<DownloadLink, CatalogError>;

    /// Get lyrics for a track, `None` if the catalog has none
    async fn lyrics(&self, track_id: &str) -> Result<Option<Lyrics>, CatalogError>;

    /// Download cover art at roughly `size`x`size` pixels
    async fn cover(&self, uri: &str, size: u32) -> Result<Bytes, CatalogError>;
}

/// HTTP client for the catalog REST API
#[derive(Clone)]
pub struct HttpCatalogClient {
    base_url: String,
    http_client: Client,
}

impl HttpCatalogClient {
    /// Create a new catalog client
    pub fn new(base_url: &str) -> Result<Self, CatalogError> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let http_client = Client::builder()
            .user_agent(concat!("tunegrab/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// Build an endpoint URL from path segments, encoding each one
    fn build_url(&self, segments: &[&str]) -> String {
        let path: Vec<String> = segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!("{}/{}", self.base_url, path.join("/"))
    }

    /// Build the URL for a cover image
    ///
    /// Cover URIs contain a `%%` placeholder for the requested size and may omit the scheme.
    pub fn cover_url(&self, uri: &str, size: u32) -> String {
        let uri = uri.replace("%%", &format!("{size}x{size}"));
        if uri.starts_with("http://") || uri.starts_with("https://") {
            uri
        } else if uri.starts_with('/') {
            format!("{}{}", self.base_url, uri)
        } else {
            format!("https://{uri}")
        }
    }

    /// GET a JSON endpoint and unwrap the response envelope
    async fn get_json<T: DeserializeOwned>(
        &self,
        what: &str,
        segments: &[&str],
    ) -> Result<T, CatalogError> {
        let url = self.build_url(segments);
        debug!("Fetching {} from: {}", what, url);

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?;
        let envelope: ApiResponse<T> = serde_json::from_slice(&body)?;

        if let Some(error) = envelope.error {
            return Err(CatalogError::Api {
                name: error.name,
                message: error.message,
            });
        }

        envelope
            .result
            .ok_or_else(|| CatalogError::NotFound(what.to_string()))
    }
}

#[async_trait]
impl Catalog for HttpCatalogClient {
    async fn track(&self, id: &str) -> Result<Track, CatalogError> {
        self.get_json(&format!("track {id}"), &["tracks", id]).await
    }

    async fn album(&self, id: &str) -> Result<Album, CatalogError> {
        let album: Album = self
            .get_json(&format!("album {id}"), &["albums", id, "with-tracks"])
            .await?;
        debug!("Album {} has {} tracks", album.title, album.track_count());
        Ok(album)
    }

    async fn playlist(&self, owner: &str, kind: &str) -> Result<Playlist, CatalogError> {
        self.get_json(
            &format!("playlist {owner}/{kind}"),
            &["users", owner, "playlists", kind],
        )
        .await
    }

    async fn artist(&self, id: &str) -> Result<ArtistCatalog, CatalogError> {
        self.get_json(&format!("artist {id}"), &["artists", id, "albums"])
            .await
    }

    async fn download_link(&self, track_id: &str) -> Result<DownloadLink, CatalogError> {
        self.get_json(
            &format!("download link for track {track_id}"),
            &["tracks", track_id, "download-link"],
        )
        .await
    }

    async fn lyrics(&self, track_id: &str) -> Result<Option<Lyrics>, CatalogError> {
        match self
            .get_json(
                &format!("lyrics for track {track_id}"),
                &["tracks", track_id, "lyrics"],
            )
            .await
        {
            Ok(lyrics) => Ok(Some(lyrics)),
            Err(CatalogError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn cover(&self, uri: &str, size: u32) -> Result<Bytes, CatalogError> {
        let url = self.cover_url(uri, size);
        debug!("Fetching cover art: {}", url);

        let response = self.http_client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(CatalogError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        Ok(response.bytes().await?)
    }
}
