//! Metadata previews for submitted URLs.
//!
//! One record is produced per input URL, in input order. A URL that fails to
//! classify or to fetch yields an `error` record; it never aborts the batch.

use crate::catalog::url::{classify, EstimatedTracks, UrlDescriptor, UrlKind};
use crate::catalog::{connect_optional, CatalogApi, CatalogConnector, Resource};
use crate::errors::{GamdlWebError, Result};
use crate::utils::Utils;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

const CONCURRENT_LOOKUPS: usize = 4;

/// One track line in a preview
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummary {
    pub name: String,
    pub artist: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    pub duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
}

/// Human-readable preview of one submitted URL
#[derive(Debug, Clone, Serialize)]
pub struct PreviewRecord {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: UrlKind,
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    pub estimated_tracks: EstimatedTracks,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_tracks: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tracks: Vec<TrackSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<String>,
    pub has_more_tracks: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PreviewRecord {
    /// Low-fidelity record built from the URL alone
    pub fn from_descriptor(descriptor: &UrlDescriptor) -> Self {
        Self {
            url: descriptor.raw_url.clone(),
            kind: descriptor.kind,
            id: descriptor.id.clone(),
            title: descriptor.title.clone(),
            artist: None,
            curator: None,
            album: None,
            estimated_tracks: descriptor.estimated_tracks.clone(),
            actual_tracks: None,
            release_date: None,
            genre: None,
            description: None,
            duration: None,
            track_number: None,
            tracks: Vec::new(),
            total_duration: None,
            has_more_tracks: false,
            note: None,
            error: (descriptor.kind == UrlKind::Error).then(|| descriptor.title.clone()),
        }
    }

    /// Classifier-only record marked as failed; the title still names what was requested
    fn fetch_error(descriptor: &UrlDescriptor, err: &GamdlWebError) -> Self {
        Self {
            kind: UrlKind::Error,
            error: Some(format!("Error processing URL: {}", err)),
            ..Self::from_descriptor(descriptor)
        }
    }
}

/// Sum of estimated track counts; non-numeric estimates count as one
pub fn total_estimated_tracks(records: &[PreviewRecord]) -> u32 {
    records.iter().map(|record| record.estimated_tracks.as_count()).sum()
}

/// Produces preview records, using the catalog API when credentials allow it
pub struct MetadataFetcher {
    connector: Arc<dyn CatalogConnector>,
    track_limit: usize,
}

impl MetadataFetcher {
    pub fn new(connector: Arc<dyn CatalogConnector>, track_limit: usize) -> Self {
        Self { connector, track_limit }
    }

    /// Preview every URL; without usable credentials records come from the classifier only
    pub async fn fetch(&self, urls: &[String], cookies_path: Option<&Path>) -> Vec<PreviewRecord> {
        let api = connect_optional(self.connector.as_ref(), cookies_path).await;
        build_previews(api.as_deref(), urls, self.track_limit).await
    }
}

/// Build one record per URL, preserving order
pub async fn build_previews(
    api: Option<&dyn CatalogApi>,
    urls: &[String],
    track_limit: usize,
) -> Vec<PreviewRecord> {
    stream::iter(urls.iter().cloned())
        .map(move |url| async move { preview_one(api, &url, track_limit).await })
        .buffered(CONCURRENT_LOOKUPS)
        .collect()
        .await
}

async fn preview_one(api: Option<&dyn CatalogApi>, url: &str, track_limit: usize) -> PreviewRecord {
    let descriptor = classify(url);

    let api = match api {
        Some(api) if descriptor.is_resolvable() => api,
        _ => return PreviewRecord::from_descriptor(&descriptor),
    };

    match fetch_record(api, &descriptor, track_limit).await {
        Ok(record) => record,
        Err(e) => {
            warn!("Could not fetch metadata for {} {}: {}", descriptor.kind, descriptor.id, e);
            PreviewRecord::fetch_error(&descriptor, &e)
        }
    }
}

async fn fetch_record(
    api: &dyn CatalogApi,
    descriptor: &UrlDescriptor,
    track_limit: usize,
) -> Result<PreviewRecord> {
    let base = PreviewRecord::from_descriptor(descriptor);

    let record = match descriptor.kind {
        UrlKind::Album => {
            let album = api.get_album(&descriptor.id).await?;
            let tracks = album.tracks();
            PreviewRecord {
                title: album.name_or("Unknown Album"),
                artist: Some(artist_or(&album, "Unknown Artist")),
                release_date: album.attributes.release_date.clone(),
                genre: album.genres(),
                tracks: tracks
                    .iter()
                    .take(track_limit)
                    .map(|track| TrackSummary {
                        name: track.name_or("Unknown"),
                        artist: artist_or(track, "Unknown"),
                        album: None,
                        duration: duration_of(track),
                        track_number: Some(track.attributes.track_number.unwrap_or(0)),
                    })
                    .collect(),
                ..with_track_totals(base, tracks, track_limit)
            }
        }
        UrlKind::Playlist => {
            let playlist = api.get_playlist(&descriptor.id).await?;
            let tracks = playlist.tracks();
            PreviewRecord {
                title: playlist.name_or("Unknown Playlist"),
                curator: Some(
                    playlist.attributes.curator_name.clone().unwrap_or_else(|| "Unknown".to_string()),
                ),
                description: Some(
                    playlist
                        .attributes
                        .description
                        .as_ref()
                        .and_then(|d| d.standard.clone())
                        .unwrap_or_default(),
                ),
                tracks: tracks
                    .iter()
                    .take(track_limit)
                    .map(|track| TrackSummary {
                        name: track.name_or("Unknown"),
                        artist: artist_or(track, "Unknown"),
                        album: Some(track.attributes.album_name.clone().unwrap_or_else(|| "Unknown".to_string())),
                        duration: duration_of(track),
                        track_number: None,
                    })
                    .collect(),
                ..with_track_totals(base, tracks, track_limit)
            }
        }
        UrlKind::Song => {
            let song = api.get_song(&descriptor.id).await?;
            PreviewRecord {
                title: song.name_or("Unknown Song"),
                artist: Some(artist_or(&song, "Unknown Artist")),
                album: Some(song.attributes.album_name.clone().unwrap_or_else(|| "Unknown Album".to_string())),
                estimated_tracks: EstimatedTracks::Exact(1),
                actual_tracks: Some(1),
                duration: Some(duration_of(&song)),
                genre: song.genres(),
                release_date: song.attributes.release_date.clone(),
                track_number: Some(song.attributes.track_number.unwrap_or(1)),
                ..base
            }
        }
        UrlKind::Artist => {
            let artist = api.get_artist(&descriptor.id).await?;
            PreviewRecord {
                title: artist.name_or("Unknown Artist"),
                estimated_tracks: EstimatedTracks::Range("Many albums/songs".to_string()),
                genre: artist.genres(),
                note: Some("Artist pages may contain multiple albums and singles".to_string()),
                ..base
            }
        }
        UrlKind::Unknown | UrlKind::Error => base,
    };

    Ok(record)
}

fn with_track_totals(base: PreviewRecord, tracks: &[Resource], track_limit: usize) -> PreviewRecord {
    let count = u32::try_from(tracks.len()).unwrap_or(u32::MAX);
    let total_ms: u64 = tracks
        .iter()
        .map(|track| track.attributes.duration_in_millis.unwrap_or(0))
        .sum();

    PreviewRecord {
        estimated_tracks: EstimatedTracks::Exact(count),
        actual_tracks: Some(count),
        total_duration: Some(Utils::format_duration_ms(total_ms)),
        has_more_tracks: tracks.len() > track_limit,
        ..base
    }
}

fn artist_or(resource: &Resource, fallback: &str) -> String {
    resource.attributes.artist_name.clone().unwrap_or_else(|| fallback.to_string())
}

fn duration_of(resource: &Resource) -> String {
    Utils::format_duration_ms(resource.attributes.duration_in_millis.unwrap_or(0))
}
