//! Catalog URL classification.
//!
//! Turns a raw Apple Music link into a [`UrlDescriptor`] (content kind plus
//! catalog identifier). Classification never fails outright: unrecognized
//! shapes become [`UrlKind::Unknown`] and rejected input becomes
//! [`UrlKind::Error`] with the reason embedded in the title.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

const MAX_URL_LEN: usize = 2048;

/// Content kind of a catalog URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlKind {
    Album,
    Playlist,
    Song,
    Artist,
    Unknown,
    Error,
}

impl fmt::Display for UrlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlKind::Album => write!(f, "album"),
            UrlKind::Playlist => write!(f, "playlist"),
            UrlKind::Song => write!(f, "song"),
            UrlKind::Artist => write!(f, "artist"),
            UrlKind::Unknown => write!(f, "unknown"),
            UrlKind::Error => write!(f, "error"),
        }
    }
}

/// Track count shown before real metadata is available: exact or a rough range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EstimatedTracks {
    Exact(u32),
    Range(String),
}

impl EstimatedTracks {
    /// Contribution to a batch total; ranges count as one
    pub fn as_count(&self) -> u32 {
        match self {
            EstimatedTracks::Exact(n) => *n,
            EstimatedTracks::Range(_) => 1,
        }
    }

    fn for_kind(kind: UrlKind) -> Self {
        match kind {
            UrlKind::Song => EstimatedTracks::Exact(1),
            UrlKind::Album => EstimatedTracks::Range("5-15".to_string()),
            UrlKind::Playlist => EstimatedTracks::Range("10-100".to_string()),
            UrlKind::Artist => EstimatedTracks::Range("20-200".to_string()),
            UrlKind::Unknown => EstimatedTracks::Exact(1),
            UrlKind::Error => EstimatedTracks::Exact(0),
        }
    }
}

/// Classified catalog URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlDescriptor {
    #[serde(rename = "url")]
    pub raw_url: String,
    #[serde(rename = "type")]
    pub kind: UrlKind,
    pub id: String,
    /// Display title derived from the URL slug (or the error message)
    pub title: String,
    pub estimated_tracks: EstimatedTracks,
}

impl UrlDescriptor {
    pub fn is_artist(&self) -> bool {
        self.kind == UrlKind::Artist
    }

    /// Whether the descriptor points at a concrete catalog entity
    pub fn is_resolvable(&self) -> bool {
        matches!(self.kind, UrlKind::Album | UrlKind::Playlist | UrlKind::Song | UrlKind::Artist)
    }

    fn error(raw_url: &str, err: &ClassifyError) -> Self {
        Self {
            raw_url: raw_url.to_string(),
            kind: UrlKind::Error,
            id: "error".to_string(),
            title: format!("Error parsing URL: {}", err),
            estimated_tracks: EstimatedTracks::for_kind(UrlKind::Error),
        }
    }

    fn unknown(raw_url: &str) -> Self {
        Self {
            raw_url: raw_url.to_string(),
            kind: UrlKind::Unknown,
            id: "unknown".to_string(),
            title: "Unknown Content".to_string(),
            estimated_tracks: EstimatedTracks::for_kind(UrlKind::Unknown),
        }
    }
}

/// Input that cannot be classified at all
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("URL is empty")]
    Empty,

    #[error("URL is longer than {MAX_URL_LEN} characters")]
    TooLong,

    #[error("URL contains control characters")]
    ControlCharacters,
}

struct Pattern {
    kind: UrlKind,
    regex: Regex,
}

// Song links embedded in album URLs (`?i=`) must be tried before plain albums.
fn patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        const PREFIX: &str = r"music\.apple\.com/(?:[a-z]{2}/)?";
        const SLUG: &str = r"(?:(?P<slug>[^/?#]+)/)?";
        let table = [
            (UrlKind::Song, format!(r"{PREFIX}album/{SLUG}\d+\?(?:[^#]*&)?i=(?P<id>\d+)")),
            (UrlKind::Song, format!(r"{PREFIX}song/{SLUG}(?P<id>\d+)")),
            (UrlKind::Album, format!(r"{PREFIX}album/{SLUG}(?P<id>\d+)")),
            (UrlKind::Playlist, format!(r"{PREFIX}playlist/{SLUG}(?P<id>pl\.[^/?#]+)")),
            (UrlKind::Artist, format!(r"{PREFIX}artist/{SLUG}(?P<id>\d+)")),
        ];
        table
            .into_iter()
            .filter_map(|(kind, pattern)| match Regex::new(&pattern) {
                Ok(regex) => Some(Pattern { kind, regex }),
                Err(e) => {
                    tracing::error!("Invalid URL pattern for {}: {}", kind, e);
                    None
                }
            })
            .collect()
    })
}

/// Classify a URL, reporting rejected input as a typed error
pub fn try_classify(raw_url: &str) -> Result<UrlDescriptor, ClassifyError> {
    let url = raw_url.trim();
    if url.is_empty() {
        return Err(ClassifyError::Empty);
    }
    if url.len() > MAX_URL_LEN {
        return Err(ClassifyError::TooLong);
    }
    if url.chars().any(|c| c.is_control()) {
        return Err(ClassifyError::ControlCharacters);
    }

    for pattern in patterns() {
        if let Some(captures) = pattern.regex.captures(url) {
            let Some(id) = captures.name("id") else { continue };
            let id = id.as_str().to_string();
            let title = captures
                .name("slug")
                .map(|slug| title_from_slug(slug.as_str()))
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| format!("{} (ID: {})", title_case(&pattern.kind.to_string()), id));

            return Ok(UrlDescriptor {
                raw_url: url.to_string(),
                kind: pattern.kind,
                id,
                title,
                estimated_tracks: EstimatedTracks::for_kind(pattern.kind),
            });
        }
    }

    Ok(UrlDescriptor::unknown(url))
}

/// Classify a URL; rejected input becomes an `error`-kind descriptor
pub fn classify(raw_url: &str) -> UrlDescriptor {
    try_classify(raw_url).unwrap_or_else(|e| UrlDescriptor::error(raw_url, &e))
}

/// Split a newline-separated URL block into trimmed, non-empty lines
pub fn split_urls(block: &str) -> Vec<String> {
    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn title_from_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|word| !word.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_album_url() {
        let descriptor = classify("https://music.apple.com/us/album/some-name/1234567890");
        assert_eq!(descriptor.kind, UrlKind::Album);
        assert_eq!(descriptor.id, "1234567890");
        assert_eq!(descriptor.title, "Some Name");
        assert_eq!(descriptor.estimated_tracks, EstimatedTracks::Range("5-15".to_string()));
    }

    #[test]
    fn test_song_inside_album_url() {
        let descriptor = classify("https://music.apple.com/gb/album/the-album/1440857781?i=1440858006");
        assert_eq!(descriptor.kind, UrlKind::Song);
        assert_eq!(descriptor.id, "1440858006");
        assert_eq!(descriptor.estimated_tracks, EstimatedTracks::Exact(1));

        let descriptor = classify("https://music.apple.com/us/album/x/1?l=en&i=42");
        assert_eq!(descriptor.kind, UrlKind::Song);
        assert_eq!(descriptor.id, "42");
    }

    #[test]
    fn test_song_url() {
        let descriptor = classify("https://music.apple.com/us/song/bohemian-rhapsody/1440806041");
        assert_eq!(descriptor.kind, UrlKind::Song);
        assert_eq!(descriptor.id, "1440806041");
        assert_eq!(descriptor.title, "Bohemian Rhapsody");
    }

    #[test]
    fn test_playlist_url() {
        let descriptor = classify("https://music.apple.com/us/playlist/todays-hits/pl.f4d106fed2bd41149aaacabb233eb5eb?ls");
        assert_eq!(descriptor.kind, UrlKind::Playlist);
        assert_eq!(descriptor.id, "pl.f4d106fed2bd41149aaacabb233eb5eb");
        assert_eq!(descriptor.title, "Todays Hits");
    }

    #[test]
    fn test_artist_url() {
        let descriptor = classify("https://music.apple.com/us/artist/radiohead/657515");
        assert_eq!(descriptor.kind, UrlKind::Artist);
        assert_eq!(descriptor.id, "657515");
        assert!(descriptor.is_artist());
    }

    #[test]
    fn test_url_without_storefront_or_slug() {
        let descriptor = classify("https://music.apple.com/album/1234");
        assert_eq!(descriptor.kind, UrlKind::Album);
        assert_eq!(descriptor.id, "1234");
        assert_eq!(descriptor.title, "Album (ID: 1234)");
    }

    #[test]
    fn test_unknown_shapes() {
        for url in [
            "https://example.com/album/x/1",
            "not a url at all",
            "https://music.apple.com/us/browse",
            "https://music.apple.com/us/album/no-id-here",
        ] {
            let descriptor = classify(url);
            assert_eq!(descriptor.kind, UrlKind::Unknown, "{url}");
            assert_eq!(descriptor.id, "unknown");
            assert!(!descriptor.is_resolvable());
        }
    }

    #[test]
    fn test_rejected_input_becomes_error_record() {
        assert_eq!(try_classify("   "), Err(ClassifyError::Empty));

        let descriptor = classify("https://music.apple.com/us/album/a\u{0}/1");
        assert_eq!(descriptor.kind, UrlKind::Error);
        assert_eq!(descriptor.id, "error");
        assert!(descriptor.title.contains("control characters"));

        let long = format!("https://music.apple.com/{}", "a".repeat(MAX_URL_LEN));
        assert_eq!(classify(&long).kind, UrlKind::Error);
    }

    #[test]
    fn test_split_urls() {
        let urls = split_urls("  https://a\n\n https://b \r\n");
        assert_eq!(urls, vec!["https://a".to_string(), "https://b".to_string()]);
    }

    #[test]
    fn test_estimated_count() {
        assert_eq!(EstimatedTracks::Exact(12).as_count(), 12);
        assert_eq!(EstimatedTracks::Range("5-15".to_string()).as_count(), 1);
        assert_eq!(serde_json::to_string(&EstimatedTracks::Exact(3)).unwrap(), "3");
    }
}
