//! HTTP routes of the control panel.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::catalog::cookies::{self, CookiesStatus};
use crate::catalog::preview::total_estimated_tracks;
use crate::catalog::url::{classify, split_urls};
use crate::catalog::{resolve_cookies_path, PreviewRecord};
use crate::errors::GamdlWebError;
use crate::jobs::store::{JobEntry, JobSummary};
use crate::jobs::{ArtistDownloadType, DownloadRequest, JobId, JobProgress, JobStore, Submission};
use crate::server::state::{GuardedConfig, ServerState};
use crate::utils::Utils;

const ARTIST_OPTIONS_MESSAGE: &str = "Artist URLs detected. Please specify what to download from artists.";

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub urls: String,
    #[serde(default)]
    pub cookies_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub metadata: Vec<PreviewRecord>,
    pub total_estimated_tracks: u32,
    pub has_artists: bool,
}

#[derive(Debug, Serialize)]
pub struct ArtistOptionsRequired {
    pub error: &'static str,
    pub requires_artist_options: bool,
    pub artist_options: [ArtistDownloadType; 2],
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub download_id: JobId,
    pub status: &'static str,
    pub message: &'static str,
    pub download_folder: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse<'a, D: Serialize> {
    pub status: &'static str,
    pub details: &'a D,
    pub progress: &'a JobProgress,
    pub download_folder: &'a std::path::Path,
}

#[derive(Debug, Serialize)]
pub struct DownloadsResponse {
    pub downloads: Vec<JobSummary>,
}

#[derive(Debug, Serialize)]
pub struct UploadCookiesResponse {
    pub message: String,
    pub filepath: PathBuf,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for GamdlWebError {
    fn into_response(self) -> Response {
        let status = match &self {
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            GamdlWebError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

fn bad_json(rejection: JsonRejection) -> GamdlWebError {
    GamdlWebError::InvalidOption(rejection.body_text())
}

fn has_artist_urls(urls: &[String]) -> bool {
    urls.iter().any(|url| classify(url).is_artist())
}

// =============================================================================
// Handlers
// =============================================================================

async fn preview(
    State(state): State<ServerState>,
    payload: Result<Json<PreviewRequest>, JsonRejection>,
) -> Result<Json<PreviewResponse>, GamdlWebError> {
    let Json(request) = payload.map_err(bad_json)?;
    let urls = split_urls(&request.urls);
    if urls.is_empty() {
        return Err(GamdlWebError::InvalidUrl("No URLs provided".to_string()));
    }

    let cookies_path = resolve_cookies_path(request.cookies_path.as_deref(), &state.config.cookies_path);
    let metadata = state.fetcher.fetch(&urls, cookies_path.as_deref()).await;

    Ok(Json(PreviewResponse {
        total_estimated_tracks: total_estimated_tracks(&metadata),
        has_artists: has_artist_urls(&urls),
        metadata,
    }))
}

async fn download(
    State(state): State<ServerState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Response, GamdlWebError> {
    let Json(request) = payload.map_err(bad_json)?;
    let urls = request.url_list();
    if urls.is_empty() {
        return Err(GamdlWebError::InvalidUrl("No URLs provided".to_string()));
    }

    if has_artist_urls(&urls) && request.artist_download_type.is_none() {
        let body = ArtistOptionsRequired {
            error: ARTIST_OPTIONS_MESSAGE,
            requires_artist_options: true,
            artist_options: [ArtistDownloadType::Albums, ArtistDownloadType::MusicVideos],
        };
        return Ok((StatusCode::BAD_REQUEST, Json(body)).into_response());
    }

    let cookies_path = resolve_cookies_path(request.cookies_path.as_deref(), &state.config.cookies_path);
    let metadata = state.fetcher.fetch(&urls, cookies_path.as_deref()).await;
    let options = request.job_options(cookies_path);
    let base_output = request
        .output_path
        .as_deref()
        .map(Utils::expand_home)
        .unwrap_or_else(|| state.config.download_directory.clone());

    let handle = state.launcher.submit(Submission {
        urls,
        options,
        metadata,
        base_output,
    })
    .await?;
    info!(
        download_id = %handle.id,
        running = state.store.running_count(),
        "Download started in {}",
        handle.download_folder.display()
    );

    Ok(Json(DownloadResponse {
        download_id: handle.id,
        status: "started",
        message: "Download started successfully",
        download_folder: handle.download_folder,
    })
    .into_response())
}

async fn status(State(store): State<JobStore>, Path(id): Path<String>) -> Response {
    match store.get(&JobId::from(id.as_str())) {
        Some(JobEntry::Running { details, progress }) => Json(StatusResponse {
            status: "running",
            details: &details,
            progress: &progress,
            download_folder: &details.download_folder,
        })
        .into_response(),
        Some(JobEntry::Finished {
            details, result, progress, ..
        }) => Json(StatusResponse {
            status: "completed",
            details: &result,
            progress: &progress,
            download_folder: &details.download_folder,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "Download ID not found".to_string(),
            }),
        )
            .into_response(),
    }
}

async fn list_downloads(State(store): State<JobStore>) -> Json<DownloadsResponse> {
    Json(DownloadsResponse { downloads: store.list() })
}

async fn upload_cookies(
    State(config): State<GuardedConfig>,
    mut multipart: Multipart,
) -> Result<Json<UploadCookiesResponse>, GamdlWebError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GamdlWebError::InvalidOption(e.body_text()))?
    {
        if field.name() != Some("cookies_file") {
            continue;
        }
        if field.file_name().map_or(true, str::is_empty) {
            return Err(GamdlWebError::Cookies("No file selected".to_string()));
        }

        let content = field
            .bytes()
            .await
            .map_err(|e| GamdlWebError::InvalidOption(e.body_text()))?;
        if content.iter().all(u8::is_ascii_whitespace) {
            return Err(GamdlWebError::Cookies("Uploaded cookies file is empty".to_string()));
        }

        let target = config.cookies_path.clone();
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &content).await?;
        info!("Saved uploaded cookies to {} ({} bytes)", target.display(), content.len());

        return Ok(Json(UploadCookiesResponse {
            message: format!("Cookies file uploaded and saved as {}", target.display()),
            filepath: target,
        }));
    }

    Err(GamdlWebError::Cookies("No cookies file provided".to_string()))
}

async fn cookies_status(State(config): State<GuardedConfig>) -> Json<CookiesStatus> {
    Json(cookies::inspect(&config.cookies_path))
}

pub fn make_app(state: ServerState) -> Router {
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/preview", post(preview))
        .route("/download", post(download))
        .route("/status/{id}", get(status))
        .route("/downloads", get(list_downloads))
        .route("/upload_cookies", post(upload_cookies))
        .route("/cookies-status", get(cookies_status))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
