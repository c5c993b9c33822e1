pub mod launcher;
pub mod options;
pub mod progress;
pub mod runner;
pub mod store;

pub use launcher::{JobLauncher, Submission};
pub use options::{ArtistDownloadType, DownloadMode, DownloadRequest, JobOptions, ToolCommand};
pub use runner::{ToolSpawner, TokioSpawner};
pub use store::{JobEntry, JobStore};

use crate::catalog::PreviewRecord;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;

/// Number of trailing output lines kept per job
pub const OUTPUT_LINES_CAPACITY: usize = 100;

/// Process-unique job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Live status of a running job as derived from its output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    #[default]
    Starting,
    Running,
    Downloading,
    Processing,
    Completed,
    Error,
    Timeout,
}

/// Terminal status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    Completed,
    Failed,
    Timeout,
    Error,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Completed => write!(f, "completed"),
            JobOutcome::Failed => write!(f, "failed"),
            JobOutcome::Timeout => write!(f, "timeout"),
            JobOutcome::Error => write!(f, "error"),
        }
    }
}

/// Bounded buffer of the most recent output lines, oldest dropped first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBuffer {
    lines: VecDeque<String>,
}

impl OutputBuffer {
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == OUTPUT_LINES_CAPACITY {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Lines joined with newlines
    pub fn joined(&self) -> String {
        self.iter().collect::<Vec<_>>().join("\n")
    }
}

impl Serialize for OutputBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.lines.iter())
    }
}

/// Progress of one job
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobProgress {
    pub total_tracks: u32,
    pub completed_tracks: u32,
    pub current_track: String,
    pub status: ProgressStatus,
    pub output_lines: OutputBuffer,
    pub download_folder: PathBuf,
    pub metadata: Vec<PreviewRecord>,
}

impl JobProgress {
    /// Fresh progress seeded from the preview of the submitted URLs
    pub fn starting(download_folder: PathBuf, metadata: Vec<PreviewRecord>) -> Self {
        let total_tracks = crate::catalog::preview::total_estimated_tracks(&metadata);
        Self {
            total_tracks,
            current_track: "Starting download...".to_string(),
            download_folder,
            metadata,
            ..Self::default()
        }
    }
}

/// Details shown for a job that has not terminated yet
#[derive(Debug, Clone, Serialize)]
pub struct RunningDetails {
    pub command: String,
    pub start_time: DateTime<Utc>,
    pub download_folder: PathBuf,
}

/// Terminal record of a job, written once
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub status: JobOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stdout: String,
    pub command: String,
    pub end_time: DateTime<Utc>,
}

impl JobResult {
    pub fn exited(code: Option<i32>, stdout: String, command: String) -> Self {
        let status = if code == Some(0) { JobOutcome::Completed } else { JobOutcome::Failed };
        Self {
            status,
            returncode: code,
            error: None,
            stdout,
            command,
            end_time: Utc::now(),
        }
    }

    pub fn timed_out(timeout_secs: u64, stdout: String, command: String) -> Self {
        Self {
            status: JobOutcome::Timeout,
            returncode: None,
            error: Some(format!("Download timed out after {} seconds", timeout_secs)),
            stdout,
            command,
            end_time: Utc::now(),
        }
    }

    pub fn errored(error: impl fmt::Display, stdout: String, command: String) -> Self {
        Self {
            status: JobOutcome::Error,
            returncode: None,
            error: Some(error.to_string()),
            stdout,
            command,
            end_time: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_buffer_keeps_latest_lines() {
        let mut buffer = OutputBuffer::default();
        for i in 0..250 {
            buffer.push(format!("line {}", i));
            assert!(buffer.iter().count() <= OUTPUT_LINES_CAPACITY);
        }

        let lines: Vec<&str> = buffer.iter().collect();
        assert_eq!(lines.len(), 100);
        assert_eq!(lines[0], "line 150");
        assert_eq!(lines[99], "line 249");
        assert_eq!(serde_json::to_value(&buffer).unwrap()[0], "line 150");
    }

    #[test]
    fn test_result_from_exit_code() {
        let failed = JobResult::exited(Some(1), String::new(), "gamdl".to_string());
        assert_eq!(failed.status, JobOutcome::Failed);
        assert_eq!(failed.returncode, Some(1));

        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["returncode"], 1);

        let ok = JobResult::exited(Some(0), String::new(), "gamdl".to_string());
        assert_eq!(ok.status, JobOutcome::Completed);

        let killed = JobResult::exited(None, String::new(), "gamdl".to_string());
        assert_eq!(killed.status, JobOutcome::Failed);
    }

    #[test]
    fn test_end_time_serializes_as_rfc3339() {
        let result = JobResult::exited(Some(0), String::new(), "gamdl".to_string());
        let json = serde_json::to_value(&result).unwrap();
        let end_time = json["end_time"].as_str().unwrap();
        assert_eq!(
            chrono::DateTime::parse_from_rfc3339(end_time).unwrap().timestamp(),
            result.end_time.timestamp()
        );
    }

    #[test]
    fn test_timeout_result_message() {
        let result = JobResult::timed_out(600, String::new(), "gamdl".to_string());
        assert_eq!(result.status, JobOutcome::Timeout);
        assert_eq!(result.error.as_deref(), Some("Download timed out after 600 seconds"));
    }

    #[test]
    fn test_job_ids_are_unique() {
        assert_ne!(JobId::generate(), JobId::generate());
    }
}
