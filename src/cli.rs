use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::url::classify;
use crate::catalog::{resolve_cookies_path, AppleMusicConnector, CatalogConnector, MetadataFetcher};
use crate::jobs::options::{CoverFormat, LogLevel};
use crate::jobs::store::RetentionPolicy;
use crate::jobs::{
    ArtistDownloadType, DownloadMode, DownloadRequest, JobEntry, JobLauncher, JobOutcome, JobStore, Submission,
    TokioSpawner,
};
use crate::server::{self, ServerState};
use crate::settings::Settings;
use crate::utils::logger::Logger;

/// GAMDL web panel - preview and download Apple Music content through gamdl
#[derive(Parser)]
#[command(name = "gamdl-web")]
#[command(about = "Web control panel and CLI for the gamdl Apple Music downloader")]
#[command(version)]
pub struct Cli {
    /// Settings file to use instead of the standard locations
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP control panel
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print metadata previews for Apple Music URLs
    Preview {
        /// Apple Music URLs
        #[arg(required = true)]
        urls: Vec<String>,

        /// Netscape cookies file
        #[arg(short, long)]
        cookies: Option<String>,
    },

    /// Download Apple Music URLs and follow progress until done
    Download(DownloadArgs),

    /// Configure application settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Args)]
pub struct DownloadArgs {
    /// Apple Music URLs
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Netscape cookies file
    #[arg(short, long)]
    pub cookies: Option<String>,

    /// Base directory for the job folder
    #[arg(short, long)]
    pub output: Option<String>,

    /// What to download from artist URLs
    #[arg(long, value_enum)]
    pub artist: Option<ArtistDownloadType>,

    /// Use the options below instead of the basic defaults
    #[arg(long)]
    pub advanced: bool,

    /// Metadata language
    #[arg(short, long)]
    pub language: Option<String>,

    #[arg(long, value_enum)]
    pub cover_format: Option<CoverFormat>,

    #[arg(long)]
    pub codec_song: Option<String>,

    #[arg(long)]
    pub quality_post: Option<String>,

    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    #[arg(long)]
    pub save_cover: bool,

    #[arg(long)]
    pub save_playlist: bool,

    #[arg(long)]
    pub overwrite: bool,

    #[arg(long)]
    pub no_synced_lyrics: bool,

    #[arg(long)]
    pub synced_lyrics_only: bool,

    #[arg(long)]
    pub disable_music_video_skip: bool,
}

impl DownloadArgs {
    fn into_request(self) -> DownloadRequest {
        DownloadRequest {
            urls: self.urls.join("\n"),
            mode: if self.advanced { DownloadMode::Advanced } else { DownloadMode::Basic },
            output_path: self.output,
            cookies_path: self.cookies,
            artist_download_type: self.artist,
            language: self.language,
            cover_format: self.cover_format,
            codec_song: self.codec_song,
            quality_post: self.quality_post,
            log_level: self.log_level,
            save_cover: self.save_cover,
            save_playlist: self.save_playlist,
            overwrite: self.overwrite,
            no_synced_lyrics: self.no_synced_lyrics,
            synced_lyrics_only: self.synced_lyrics_only,
            disable_music_video_skip: self.disable_music_video_skip,
        }
    }
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set download directory
    SetDir {
        /// Directory path
        path: PathBuf,
    },

    /// Set the default cookies file
    SetCookies {
        /// Cookies file path
        path: PathBuf,
    },

    /// Set the download tool invocation
    SetTool {
        /// Executable
        program: String,
        /// Arguments placed before the options
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
        args: Vec<String>,
    },

    /// Reset to default settings
    Reset,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self, settings: Settings) -> anyhow::Result<()> {
        match self.command {
            Commands::Serve { host, port } => handle_serve(settings, host, port).await,
            Commands::Preview { urls, cookies } => handle_preview(settings, urls, cookies).await,
            Commands::Download(args) => handle_download(settings, args).await,
            Commands::Config { command } => handle_config(settings, command),
        }
    }
}

async fn handle_serve(settings: Settings, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = settings.into_config();
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    config
        .ensure_download_directory()
        .context("Could not prepare the download directory")?;
    Logger::log_config_loaded(&config.download_directory.display().to_string(), &config.tool.program);

    let connector = Arc::new(AppleMusicConnector::new(config.catalog.clone()));
    let state = ServerState::new(config, connector, Arc::new(TokioSpawner));
    server::run_server(state).await.context("HTTP server failed")
}

async fn handle_preview(settings: Settings, urls: Vec<String>, cookies: Option<String>) -> anyhow::Result<()> {
    let config = settings.config();
    let connector: Arc<dyn CatalogConnector> = Arc::new(AppleMusicConnector::new(config.catalog.clone()));
    let fetcher = MetadataFetcher::new(connector, config.catalog.preview_track_limit);

    let cookies_path = resolve_cookies_path(cookies.as_deref(), &config.cookies_path);
    if cookies_path.is_none() {
        tracing::info!("No cookies file found; previews are based on the URLs only");
    }

    let records = fetcher.fetch(&urls, cookies_path.as_deref()).await;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

async fn handle_download(settings: Settings, args: DownloadArgs) -> anyhow::Result<()> {
    let config = settings.into_config();
    let request = args.into_request();
    let urls = request.url_list();

    if request.artist_download_type.is_none() && urls.iter().any(|url| classify(url).is_artist()) {
        bail!("Artist URLs detected. Use --artist albums or --artist music-videos");
    }

    let connector: Arc<dyn CatalogConnector> = Arc::new(AppleMusicConnector::new(config.catalog.clone()));
    let fetcher = MetadataFetcher::new(connector.clone(), config.catalog.preview_track_limit);
    let store = JobStore::new(RetentionPolicy::from(&config.retention));
    let launcher = JobLauncher::new(store.clone(), Arc::new(TokioSpawner), connector, config.tool.clone());

    let cookies_path = resolve_cookies_path(request.cookies_path.as_deref(), &config.cookies_path);
    let metadata = fetcher.fetch(&urls, cookies_path.as_deref()).await;
    for record in &metadata {
        println!("{} [{}] {}", record.kind, record.id, record.title);
    }

    let base_output = request
        .output_path
        .as_deref()
        .map(crate::utils::Utils::expand_home)
        .unwrap_or_else(|| config.download_directory.clone());
    let options = request.job_options(cookies_path);

    let handle = launcher
        .submit(Submission {
            urls,
            options,
            metadata,
            base_output,
        })
        .await?;
    println!("Download {} started in {}", handle.id, handle.download_folder.display());

    let id = handle.id.clone();
    let mut task = handle.task;
    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    let mut last_line = String::new();

    let outcome = loop {
        tokio::select! {
            joined = &mut task => break joined.context("Download task failed")?,
            _ = ticker.tick() => {
                if let Some(JobEntry::Running { progress, .. }) = store.get(&id) {
                    let line = format!(
                        "[{}/{}] {:?}: {}",
                        progress.completed_tracks, progress.total_tracks, progress.status, progress.current_track
                    );
                    if line != last_line {
                        println!("{}", line);
                        last_line = line;
                    }
                }
            }
        }
    };

    if let Some(JobEntry::Finished { result, .. }) = store.get(&id) {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    match outcome {
        JobOutcome::Completed => Ok(()),
        other => bail!("Download {} ended with status {}", id, other),
    }
}

fn handle_config(mut settings: Settings, command: ConfigCommands) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Show => {
            println!("{}", toml::to_string_pretty(settings.config())?);
        }
        ConfigCommands::SetDir { path } => {
            settings.set_download_directory(path.clone())?;
            println!("Download directory set to: {}", path.display());
        }
        ConfigCommands::SetCookies { path } => {
            settings.set_cookies_path(path.clone())?;
            println!("Cookies file set to: {}", path.display());
        }
        ConfigCommands::SetTool { program, args } => {
            settings.set_tool(program.clone(), args.clone())?;
            println!("Download tool set to: {} {}", program, args.join(" "));
        }
        ConfigCommands::Reset => {
            settings.reset()?;
            println!("Settings reset to defaults");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_download_args_map_to_request() {
        let cli = Cli::try_parse_from([
            "gamdl-web",
            "download",
            "https://music.apple.com/us/artist/x/1",
            "--artist",
            "music-videos",
            "--advanced",
            "--cover-format",
            "png",
            "--overwrite",
        ])
        .unwrap();

        let Commands::Download(args) = cli.command else {
            panic!("expected download command");
        };
        let request = args.into_request();
        assert_eq!(request.mode, DownloadMode::Advanced);
        assert_eq!(request.artist_download_type, Some(ArtistDownloadType::MusicVideos));

        let options = request.job_options(None);
        assert_eq!(options.cover_format, Some(CoverFormat::Png));
        assert!(options.overwrite);
    }

    #[test]
    fn test_set_tool_accepts_hyphen_args() {
        let cli = Cli::try_parse_from(["gamdl-web", "config", "set-tool", "python3", "-m", "gamdl"]).unwrap();
        match cli.command {
            Commands::Config {
                command: ConfigCommands::SetTool { program, args },
            } => {
                assert_eq!(program, "python3");
                assert_eq!(args, vec!["-m", "gamdl"]);
            }
            _ => panic!("expected set-tool"),
        }
    }
}
