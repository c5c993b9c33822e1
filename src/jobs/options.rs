use crate::catalog::url::split_urls;
use crate::config::ToolConfig;
use crate::errors::{GamdlWebError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What to download from an artist page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ArtistDownloadType {
    #[default]
    Albums,
    MusicVideos,
}

impl fmt::Display for ArtistDownloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtistDownloadType::Albums => write!(f, "albums"),
            ArtistDownloadType::MusicVideos => write!(f, "music-videos"),
        }
    }
}

/// Submission mode of the download form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    #[default]
    Basic,
    Advanced,
}

/// Cover art format accepted by the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CoverFormat {
    Jpg,
    Png,
    Raw,
}

impl fmt::Display for CoverFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoverFormat::Jpg => write!(f, "jpg"),
            CoverFormat::Png => write!(f, "png"),
            CoverFormat::Raw => write!(f, "raw"),
        }
    }
}

/// Tool log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    #[serde(alias = "debug")]
    Debug,
    #[serde(alias = "info")]
    Info,
    #[serde(alias = "warning")]
    Warning,
    #[serde(alias = "error")]
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Every option the launcher understands; unknown keys are rejected
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobOptions {
    pub cookies_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub language: Option<String>,
    pub cover_format: Option<CoverFormat>,
    pub codec_song: Option<String>,
    pub quality_post: Option<String>,
    pub log_level: Option<LogLevel>,
    pub save_cover: bool,
    pub save_playlist: bool,
    pub overwrite: bool,
    pub no_synced_lyrics: bool,
    pub synced_lyrics_only: bool,
    pub disable_music_video_skip: bool,
    pub artist_download_type: Option<ArtistDownloadType>,
}

impl JobOptions {
    /// Defaults used by the basic form
    pub fn basic(cookies_path: Option<PathBuf>) -> Self {
        Self {
            cookies_path,
            save_cover: true,
            log_level: Some(LogLevel::Info),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.no_synced_lyrics && self.synced_lyrics_only {
            return Err(GamdlWebError::InvalidOption(
                "no_synced_lyrics and synced_lyrics_only cannot both be set".to_string(),
            ));
        }
        Ok(())
    }

    /// Tool arguments for these options; unset and empty options contribute nothing
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(path) = &self.cookies_path {
            push_pair(&mut args, "-c", &path.to_string_lossy());
        }
        if let Some(path) = &self.output_path {
            push_pair(&mut args, "-o", &path.to_string_lossy());
        }
        if let Some(language) = &self.language {
            push_pair(&mut args, "-l", language);
        }
        if let Some(format) = self.cover_format {
            push_pair(&mut args, "--cover-format", &format.to_string());
        }
        if let Some(codec) = &self.codec_song {
            push_pair(&mut args, "--codec-song", codec);
        }
        if let Some(quality) = &self.quality_post {
            push_pair(&mut args, "--quality-post", quality);
        }
        if let Some(level) = self.log_level {
            push_pair(&mut args, "--log-level", &level.to_string());
        }

        args.push("--no-exceptions".to_string());

        let flags = [
            (self.save_cover, "--save-cover"),
            (self.save_playlist, "--save-playlist"),
            (self.overwrite, "--overwrite"),
            (self.no_synced_lyrics, "--no-synced-lyrics"),
            (self.synced_lyrics_only, "--synced-lyrics-only"),
            (self.disable_music_video_skip, "--disable-music-video-skip"),
        ];
        args.extend(flags.into_iter().filter(|(on, _)| *on).map(|(_, flag)| flag.to_string()));

        args
    }
}

fn push_pair(args: &mut Vec<String>, flag: &str, value: &str) {
    if !value.trim().is_empty() {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
}

/// Program and arguments of one tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl ToolCommand {
    pub fn build(tool: &ToolConfig, options: &JobOptions, urls: &[String]) -> Self {
        let mut args = tool.base_args.clone();
        args.extend(options.to_args());
        args.extend(urls.iter().cloned());

        Self {
            program: tool.program.clone(),
            args,
            working_dir: tool.working_dir.clone(),
        }
    }

    /// Command line as displayed in job details
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn empty_as_none<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value) => serde_json::from_value(value).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Download form as submitted over HTTP or assembled by the CLI
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadRequest {
    pub urls: String,
    #[serde(default)]
    pub mode: DownloadMode,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub output_path: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub cookies_path: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub artist_download_type: Option<ArtistDownloadType>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub language: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub cover_format: Option<CoverFormat>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub codec_song: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub quality_post: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub log_level: Option<LogLevel>,
    #[serde(default)]
    pub save_cover: bool,
    #[serde(default)]
    pub save_playlist: bool,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub no_synced_lyrics: bool,
    #[serde(default)]
    pub synced_lyrics_only: bool,
    #[serde(default)]
    pub disable_music_video_skip: bool,
}

impl DownloadRequest {
    pub fn url_list(&self) -> Vec<String> {
        split_urls(&self.urls)
    }

    /// Options for the request's mode, using already-resolved credentials
    pub fn job_options(&self, cookies_path: Option<PathBuf>) -> JobOptions {
        let options = match self.mode {
            DownloadMode::Basic => JobOptions::basic(cookies_path),
            DownloadMode::Advanced => JobOptions {
                cookies_path,
                output_path: None,
                language: self.language.clone(),
                cover_format: self.cover_format,
                codec_song: self.codec_song.clone(),
                quality_post: self.quality_post.clone(),
                log_level: Some(self.log_level.unwrap_or(LogLevel::Info)),
                save_cover: self.save_cover,
                save_playlist: self.save_playlist,
                overwrite: self.overwrite,
                no_synced_lyrics: self.no_synced_lyrics,
                synced_lyrics_only: self.synced_lyrics_only,
                disable_music_video_skip: self.disable_music_video_skip,
                artist_download_type: None,
            },
        };

        JobOptions {
            artist_download_type: self.artist_download_type,
            ..options
        }
    }
}
