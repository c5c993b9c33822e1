//! Starts download jobs in the background.

use crate::catalog::url::try_classify;
use crate::catalog::{connect_optional, CatalogApi, CatalogConnector, PreviewRecord, UrlKind};
use crate::config::ToolConfig;
use crate::errors::{GamdlWebError, Result};
use crate::jobs::progress::{KeywordLineClassifier, LineClassifier};
use crate::jobs::runner::{self, ToolSpawner};
use crate::jobs::store::JobStore;
use crate::jobs::{ArtistDownloadType, JobId, JobOptions, JobOutcome, JobProgress, JobResult, RunningDetails, ToolCommand};
use crate::utils::logger::Logger;
use crate::utils::Utils;
use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{error, warn};

const SHORT_ID_LEN: usize = 8;

/// Everything needed to start one job
#[derive(Debug, Clone)]
pub struct Submission {
    pub urls: Vec<String>,
    pub options: JobOptions,
    pub metadata: Vec<PreviewRecord>,
    /// Directory the per-job folder is created in
    pub base_output: PathBuf,
}

/// Returned as soon as a job has been registered
#[derive(Debug)]
pub struct JobHandle {
    pub id: JobId,
    pub download_folder: PathBuf,
    pub task: JoinHandle<JobOutcome>,
}

pub struct JobLauncher {
    store: JobStore,
    spawner: Arc<dyn ToolSpawner>,
    connector: Arc<dyn CatalogConnector>,
    classifier: Arc<dyn LineClassifier>,
    tool: ToolConfig,
}

impl JobLauncher {
    pub fn new(
        store: JobStore,
        spawner: Arc<dyn ToolSpawner>,
        connector: Arc<dyn CatalogConnector>,
        tool: ToolConfig,
    ) -> Self {
        Self {
            store,
            spawner,
            connector,
            classifier: Arc::new(KeywordLineClassifier),
            tool,
        }
    }

    /// Register a job and start it in the background; returns without waiting for the tool
    pub async fn submit(&self, submission: Submission) -> Result<JobHandle> {
        let Submission {
            urls,
            mut options,
            metadata,
            base_output,
        } = submission;

        if urls.is_empty() {
            return Err(GamdlWebError::InvalidUrl("No URLs provided".to_string()));
        }
        options.validate()?;

        let id = JobId::generate();
        let download_folder = create_download_folder(&base_output, &metadata, &id, Local::now()).await?;
        options.output_path = Some(download_folder.clone());

        let planned = ToolCommand::build(&self.tool, &options, &urls);
        let details = RunningDetails {
            command: planned.command_line(),
            start_time: Utc::now(),
            download_folder: download_folder.clone(),
        };
        self.store
            .put(id.clone(), details, JobProgress::starting(download_folder.clone(), metadata))?;
        Logger::log_job_start(id.as_str(), &planned.command_line());

        let store = self.store.clone();
        let spawner = self.spawner.clone();
        let connector = self.connector.clone();
        let classifier = self.classifier.clone();
        let tool = self.tool.clone();
        let job_id = id.clone();

        let work = tokio::spawn(async move {
            let urls = expand_artist_urls(connector.as_ref(), &options, urls).await;
            let command = ToolCommand::build(&tool, &options, &urls);
            store.set_command(&job_id, command.command_line());
            runner::run_job(&job_id, &command, spawner.as_ref(), &store, classifier.as_ref(), tool.timeout()).await
        });

        let store = self.store.clone();
        let job_id = id.clone();
        let task = tokio::spawn(async move {
            let outcome = match work.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(job_id = %job_id, "Download task aborted: {}", e);
                    let command = store.get(&job_id).map(|entry| entry.details().command.clone()).unwrap_or_default();
                    let result = JobResult::errored(
                        format!("Download task aborted: {}", e),
                        store.output_tail(&job_id),
                        command,
                    );
                    if let Err(e) = store.finish(&job_id, result) {
                        warn!(job_id = %job_id, "Could not record job result: {}", e);
                    }
                    JobOutcome::Error
                }
            };
            Logger::log_job_finished(job_id.as_str(), &outcome.to_string());
            outcome
        });

        Ok(JobHandle {
            id,
            download_folder,
            task,
        })
    }
}

/// Folder name for a job: timestamp, then a title derived from the preview, then a short job id
pub fn folder_name(metadata: &[PreviewRecord], id: &JobId, now: DateTime<Local>) -> String {
    let short = Utils::short_id(id.as_str(), SHORT_ID_LEN);
    let label = match metadata {
        [item] if item.kind == UrlKind::Song => format!(
            "{} - {} ({})",
            item.artist.as_deref().unwrap_or("Unknown"),
            item.title,
            short
        ),
        [item] => format!("{} ({})", item.title, short),
        items => format!("Multiple Downloads ({} items) - {}", items.len(), short),
    };

    let label = Utils::sanitize_filename(&label);
    format!("{}_{}", now.format("%Y%m%d_%H%M%S"), label)
}

pub fn fallback_folder_name(id: &JobId) -> String {
    format!("gamdl_download_{}", Utils::short_id(id.as_str(), SHORT_ID_LEN))
}

/// Create the job's output folder, falling back to a generic name when the
/// derived one cannot be created
pub async fn create_download_folder(
    base: &Path,
    metadata: &[PreviewRecord],
    id: &JobId,
    now: DateTime<Local>,
) -> Result<PathBuf> {
    let preferred = base.join(folder_name(metadata, id, now));
    match fs::create_dir_all(&preferred).await {
        Ok(()) => Ok(preferred),
        Err(e) => {
            warn!("Could not create {}: {}; using fallback folder", preferred.display(), e);
            let fallback = base.join(fallback_folder_name(id));
            fs::create_dir_all(&fallback).await.map_err(|e| {
                GamdlWebError::Download(format!("Failed to create download folder {}: {}", fallback.display(), e))
            })?;
            Ok(fallback)
        }
    }
}

/// Replace artist URLs by their albums or music videos; any failure keeps the original URL
pub async fn expand_artist_urls(
    connector: &dyn CatalogConnector,
    options: &JobOptions,
    urls: Vec<String>,
) -> Vec<String> {
    let has_artists = urls
        .iter()
        .any(|url| matches!(try_classify(url), Ok(descriptor) if descriptor.is_artist()));
    if !has_artists {
        return urls;
    }

    let Some(api) = connect_optional(connector, options.cookies_path.as_deref()).await else {
        return urls;
    };
    let download_type = options.artist_download_type.unwrap_or_default();

    let mut expanded = Vec::with_capacity(urls.len());
    for url in urls {
        match try_classify(&url) {
            Ok(descriptor) if descriptor.is_artist() => {
                match expand_artist(api.as_ref(), &descriptor.id, download_type).await {
                    Ok(urls) if !urls.is_empty() => expanded.extend(urls),
                    Ok(_) => expanded.push(url),
                    Err(e) => {
                        warn!("Error expanding artist URL {}: {}", url, e);
                        expanded.push(url);
                    }
                }
            }
            _ => expanded.push(url),
        }
    }
    expanded
}

async fn expand_artist(api: &dyn CatalogApi, artist_id: &str, download_type: ArtistDownloadType) -> Result<Vec<String>> {
    let artist = api.get_artist(artist_id).await?;
    let (relationship, path) = match download_type {
        ArtistDownloadType::Albums => (artist.relationships.albums.as_ref(), "album"),
        ArtistDownloadType::MusicVideos => (artist.relationships.music_videos.as_ref(), "music-video"),
    };

    Ok(relationship
        .map(|rel| {
            rel.data
                .iter()
                .map(|item| format!("https://music.apple.com/{}/{}", path, item.id))
                .collect()
        })
        .unwrap_or_default())
}
