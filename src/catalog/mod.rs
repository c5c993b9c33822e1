pub mod apple_music;
pub mod cookies;
pub mod preview;
pub mod url;

pub use apple_music::AppleMusicConnector;
pub use preview::{MetadataFetcher, PreviewRecord};
pub use url::UrlKind;

use crate::errors::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// Catalog entity as returned by the catalog API (album, playlist, song, artist, ...)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub relationships: Relationships,
}

/// Attributes shared by the catalog entities we read
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attributes {
    pub name: Option<String>,
    pub artist_name: Option<String>,
    pub curator_name: Option<String>,
    pub album_name: Option<String>,
    pub release_date: Option<String>,
    #[serde(default)]
    pub genre_names: Vec<String>,
    pub duration_in_millis: Option<u64>,
    pub track_number: Option<u32>,
    pub description: Option<Description>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Description {
    pub standard: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Relationships {
    pub tracks: Option<Relationship>,
    pub albums: Option<Relationship>,
    #[serde(rename = "music-videos")]
    pub music_videos: Option<Relationship>,
}

/// Related resources, possibly paginated through `next`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub data: Vec<Resource>,
    pub next: Option<String>,
}

/// Response envelope of catalog endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceResponse {
    #[serde(default)]
    pub data: Vec<Resource>,
    pub next: Option<String>,
}

impl Resource {
    pub fn name_or(&self, fallback: &str) -> String {
        self.attributes.name.clone().unwrap_or_else(|| fallback.to_string())
    }

    pub fn tracks(&self) -> &[Resource] {
        self.relationships.tracks.as_ref().map(|rel| rel.data.as_slice()).unwrap_or(&[])
    }

    pub fn genres(&self) -> Option<String> {
        if self.attributes.genre_names.is_empty() {
            None
        } else {
            Some(self.attributes.genre_names.join(", "))
        }
    }
}

/// Authenticated catalog API
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn get_album(&self, id: &str) -> Result<Resource>;
    async fn get_playlist(&self, id: &str) -> Result<Resource>;
    async fn get_song(&self, id: &str) -> Result<Resource>;
    /// Artist with its `albums` and `music-videos` relationships
    async fn get_artist(&self, id: &str) -> Result<Resource>;
}

/// Builds a [`CatalogApi`] from a credentials file
#[async_trait]
pub trait CatalogConnector: Send + Sync {
    async fn connect(&self, cookies_path: &Path) -> Result<Arc<dyn CatalogApi>>;
}

/// Connect when credentials are present; any failure disables the API for this request
pub async fn connect_optional(
    connector: &dyn CatalogConnector,
    cookies_path: Option<&Path>,
) -> Option<Arc<dyn CatalogApi>> {
    let path = cookies_path?;
    match connector.connect(path).await {
        Ok(api) => Some(api),
        Err(e) => {
            tracing::warn!("Could not initialize catalog API with {}: {}", path.display(), e);
            None
        }
    }
}

/// Pick the credentials file: an explicit existing path wins, then the default file
pub fn resolve_cookies_path(requested: Option<&str>, default_path: &Path) -> Option<std::path::PathBuf> {
    if let Some(requested) = requested.map(str::trim).filter(|p| !p.is_empty()) {
        let requested = Path::new(requested);
        if requested.is_file() {
            return Some(requested.to_path_buf());
        }
        tracing::debug!("Requested cookies file {} does not exist", requested.display());
    }

    default_path.is_file().then(|| default_path.to_path_buf())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted catalog used by tests across the crate.

    use super::*;
    use crate::errors::GamdlWebError;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct FakeCatalog {
        pub resources: HashMap<(String, String), serde_json::Value>,
    }

    impl FakeCatalog {
        pub fn with(mut self, kind: &str, id: &str, value: serde_json::Value) -> Self {
            self.resources.insert((kind.to_string(), id.to_string()), value);
            self
        }

        fn lookup(&self, kind: &str, id: &str) -> Result<Resource> {
            let value = self
                .resources
                .get(&(kind.to_string(), id.to_string()))
                .ok_or_else(|| GamdlWebError::Catalog(format!("{} {} unavailable", kind, id)))?;
            Ok(serde_json::from_value(value.clone())?)
        }
    }

    #[async_trait]
    impl CatalogApi for FakeCatalog {
        async fn get_album(&self, id: &str) -> Result<Resource> {
            self.lookup("albums", id)
        }

        async fn get_playlist(&self, id: &str) -> Result<Resource> {
            self.lookup("playlists", id)
        }

        async fn get_song(&self, id: &str) -> Result<Resource> {
            self.lookup("songs", id)
        }

        async fn get_artist(&self, id: &str) -> Result<Resource> {
            self.lookup("artists", id)
        }
    }

    /// Connector handing out one shared fake catalog, or failing when `None`
    pub struct FakeConnector(pub Option<Arc<FakeCatalog>>);

    #[async_trait]
    impl CatalogConnector for FakeConnector {
        async fn connect(&self, _cookies_path: &Path) -> Result<Arc<dyn CatalogApi>> {
            match &self.0 {
                Some(catalog) => Ok(catalog.clone() as Arc<dyn CatalogApi>),
                None => Err(GamdlWebError::Cookies("invalid cookies".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_deserialize() {
        let resource: Resource = serde_json::from_value(serde_json::json!({
            "id": "1",
            "type": "albums",
            "attributes": {"name": "Kid A", "artistName": "Radiohead", "genreNames": ["Alternative", "Music"]},
            "relationships": {
                "tracks": {"data": [{"id": "11", "type": "songs", "attributes": {"name": "Idioteque", "durationInMillis": 309000}}]},
                "music-videos": {"data": []}
            }
        }))
        .unwrap();

        assert_eq!(resource.name_or("?"), "Kid A");
        assert_eq!(resource.genres().as_deref(), Some("Alternative, Music"));
        assert_eq!(resource.tracks().len(), 1);
        assert_eq!(resource.tracks()[0].attributes.duration_in_millis, Some(309000));
        assert!(resource.relationships.music_videos.is_some());
        assert!(resource.relationships.albums.is_none());
    }

    #[test]
    fn test_resolve_cookies_path() {
        let dir = tempfile::tempdir().unwrap();
        let default_path = dir.path().join("cookies.txt");
        let explicit = dir.path().join("mine.txt");

        assert_eq!(resolve_cookies_path(None, &default_path), None);

        std::fs::write(&default_path, "x").unwrap();
        assert_eq!(resolve_cookies_path(Some(""), &default_path), Some(default_path.clone()));
        assert_eq!(
            resolve_cookies_path(Some(explicit.to_str().unwrap()), &default_path),
            Some(default_path.clone())
        );

        std::fs::write(&explicit, "y").unwrap();
        assert_eq!(resolve_cookies_path(Some(explicit.to_str().unwrap()), &default_path), Some(explicit));
    }

    #[tokio::test]
    async fn test_connect_optional() {
        let path = Path::new("/nonexistent/cookies.txt");
        let failing = testing::FakeConnector(None);
        assert!(connect_optional(&failing, Some(path)).await.is_none());

        let working = testing::FakeConnector(Some(Arc::new(testing::FakeCatalog::default())));
        assert!(connect_optional(&working, None).await.is_none());
        assert!(connect_optional(&working, Some(path)).await.is_some());
    }
}
