//! In-memory job registry.
//!
//! Each job id maps to exactly one [`JobEntry`], so a job is either running
//! or finished, never both. The running-to-finished transition happens under
//! the entry's shard lock and only once.

use crate::config::RetentionConfig;
use crate::errors::{GamdlWebError, Result};
use crate::jobs::{JobId, JobOutcome, JobProgress, JobResult, ProgressStatus, RunningDetails};
use dashmap::DashMap;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// State of one job
#[derive(Debug, Clone)]
pub enum JobEntry {
    Running {
        details: RunningDetails,
        progress: JobProgress,
    },
    Finished {
        details: RunningDetails,
        result: JobResult,
        progress: JobProgress,
        finished_at: Instant,
    },
}

impl JobEntry {
    pub fn is_running(&self) -> bool {
        matches!(self, JobEntry::Running { .. })
    }

    pub fn details(&self) -> &RunningDetails {
        match self {
            JobEntry::Running { details, .. } | JobEntry::Finished { details, .. } => details,
        }
    }

    pub fn progress(&self) -> &JobProgress {
        match self {
            JobEntry::Running { progress, .. } | JobEntry::Finished { progress, .. } => progress,
        }
    }

    /// "running", or the terminal outcome
    pub fn status_label(&self) -> String {
        match self {
            JobEntry::Running { .. } => "running".to_string(),
            JobEntry::Finished { result, .. } => result.status.to_string(),
        }
    }
}

/// One line of the job listing
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub download_id: JobId,
    pub status: String,
    pub download_folder: PathBuf,
    pub total_tracks: u32,
    pub completed_tracks: u32,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

/// How long finished jobs stay queryable
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub max_finished: usize,
    pub ttl: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(&RetentionConfig::default())
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            max_finished: config.max_finished_jobs,
            ttl: Duration::from_secs(config.finished_ttl_secs),
        }
    }
}

/// Shared, cloneable handle to the job registry
#[derive(Clone, Default)]
pub struct JobStore {
    entries: Arc<DashMap<JobId, JobEntry>>,
    retention: RetentionPolicy,
}

impl JobStore {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            retention,
        }
    }

    /// Register a new running job
    pub fn put(&self, id: JobId, details: RunningDetails, progress: JobProgress) -> Result<()> {
        match self.entries.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                Err(GamdlWebError::Job(format!("Job {} already exists", entry.key())))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(JobEntry::Running { details, progress });
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &JobId) -> Option<JobEntry> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// Mutate the progress of a running job; finished jobs are left untouched
    pub fn update_progress<F>(&self, id: &JobId, update: F) -> bool
    where
        F: FnOnce(&mut JobProgress),
    {
        match self.entries.get_mut(id) {
            Some(mut entry) => match entry.value_mut() {
                JobEntry::Running { progress, .. } => {
                    update(progress);
                    true
                }
                JobEntry::Finished { .. } => false,
            },
            None => false,
        }
    }

    /// Replace the running command line once it is known
    pub fn set_command(&self, id: &JobId, command: String) {
        if let Some(mut entry) = self.entries.get_mut(id) {
            if let JobEntry::Running { details, .. } = entry.value_mut() {
                details.command = command;
            }
        }
    }

    /// Trailing output of a job, newline-joined
    pub fn output_tail(&self, id: &JobId) -> String {
        self.entries
            .get(id)
            .map(|entry| entry.value().progress().output_lines.joined())
            .unwrap_or_default()
    }

    /// Move a running job to finished; fails if it is unknown or already finished
    pub fn finish(&self, id: &JobId, result: JobResult) -> Result<()> {
        {
            let mut entry = self
                .entries
                .get_mut(id)
                .ok_or_else(|| GamdlWebError::NotFound(format!("Job {}", id)))?;

            let (details, mut progress) = match entry.value_mut() {
                JobEntry::Running { details, progress } => (details.clone(), std::mem::take(progress)),
                JobEntry::Finished { .. } => {
                    return Err(GamdlWebError::Job(format!("Job {} already finished", id)));
                }
            };

            progress.status = match result.status {
                JobOutcome::Completed => ProgressStatus::Completed,
                JobOutcome::Timeout => ProgressStatus::Timeout,
                JobOutcome::Failed | JobOutcome::Error => ProgressStatus::Error,
            };

            *entry = JobEntry::Finished {
                details,
                result,
                progress,
                finished_at: Instant::now(),
            };
        }

        self.evict();
        Ok(())
    }

    /// All jobs, newest first
    pub fn list(&self) -> Vec<JobSummary> {
        self.evict();

        let mut summaries: Vec<JobSummary> = self
            .entries
            .iter()
            .map(|entry| {
                let progress = entry.value().progress();
                let details = entry.value().details();
                JobSummary {
                    download_id: entry.key().clone(),
                    status: entry.value().status_label(),
                    download_folder: details.download_folder.clone(),
                    total_tracks: progress.total_tracks,
                    completed_tracks: progress.completed_tracks,
                    start_time: details.start_time,
                }
            })
            .collect();

        summaries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        summaries
    }

    pub fn running_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.value().is_running()).count()
    }

    /// Drop finished jobs past their TTL, then the oldest beyond the size cap.
    /// Running jobs are never evicted.
    pub fn evict(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.retention.ttl;

        self.entries.retain(|_, entry| match entry {
            JobEntry::Finished { finished_at, .. } => finished_at.elapsed() < ttl,
            JobEntry::Running { .. } => true,
        });

        let mut finished: Vec<(JobId, Instant)> = self
            .entries
            .iter()
            .filter_map(|entry| match entry.value() {
                JobEntry::Finished { finished_at, .. } => Some((entry.key().clone(), *finished_at)),
                JobEntry::Running { .. } => None,
            })
            .collect();

        if finished.len() > self.retention.max_finished {
            finished.sort_by_key(|(_, finished_at)| *finished_at);
            let excess = finished.len() - self.retention.max_finished;
            for (id, _) in finished.into_iter().take(excess) {
                self.entries.remove_if(&id, |_, entry| !entry.is_running());
            }
        }

        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!("Evicted {} finished jobs", evicted);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn details(folder: &str) -> RunningDetails {
        RunningDetails {
            command: "python3 -m gamdl".to_string(),
            start_time: Utc::now(),
            download_folder: PathBuf::from(folder),
        }
    }

    fn ok_result() -> JobResult {
        JobResult::exited(Some(0), String::new(), "python3 -m gamdl".to_string())
    }

    #[test]
    fn test_put_and_get() {
        let store = JobStore::default();
        let id = JobId::from("a");
        store.put(id.clone(), details("/d/a"), JobProgress::default()).unwrap();

        let entry = store.get(&id).unwrap();
        assert!(entry.is_running());
        assert_eq!(entry.status_label(), "running");
        assert!(store.get(&JobId::from("missing")).is_none());
        assert!(store.put(id, details("/d/a"), JobProgress::default()).is_err());
    }

    #[test]
    fn test_finish_moves_exactly_once() {
        let store = JobStore::default();
        let id = JobId::from("a");
        store.put(id.clone(), details("/d/a"), JobProgress::default()).unwrap();
        store.update_progress(&id, |p| p.completed_tracks = 3);

        store.finish(&id, ok_result()).unwrap();
        let entry = store.get(&id).unwrap();
        assert!(!entry.is_running());
        assert_eq!(entry.status_label(), "completed");
        assert_eq!(entry.progress().completed_tracks, 3);
        assert_eq!(entry.progress().status, ProgressStatus::Completed);

        let again = JobResult::exited(Some(1), String::new(), String::new());
        assert!(store.finish(&id, again).is_err());
        assert_eq!(store.get(&id).unwrap().status_label(), "completed");

        assert!(!store.update_progress(&id, |p| p.completed_tracks = 99));
        assert_eq!(store.get(&id).unwrap().progress().completed_tracks, 3);
        assert!(store.finish(&JobId::from("missing"), ok_result()).is_err());
    }

    #[test]
    fn test_list_reports_both_states() {
        let store = JobStore::default();
        store.put(JobId::from("a"), details("/d/a"), JobProgress::default()).unwrap();
        store.put(JobId::from("b"), details("/d/b"), JobProgress::default()).unwrap();
        store
            .finish(&JobId::from("b"), JobResult::exited(Some(2), String::new(), String::new()))
            .unwrap();

        let list = store.list();
        assert_eq!(list.len(), 2);
        let b = list.iter().find(|s| s.download_id.as_str() == "b").unwrap();
        assert_eq!(b.status, "failed");
        assert_eq!(store.running_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_jobs_touch_only_their_own_entry() {
        let store = JobStore::default();
        let mut handles = Vec::new();

        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let id = JobId::from(format!("job-{}", i).as_str());
                store.put(id.clone(), details("/d"), JobProgress::default()).unwrap();
                for _ in 0..10 {
                    store.update_progress(&id, |p| p.completed_tracks += 1);
                    tokio::task::yield_now().await;
                }
                store.finish(&id, ok_result()).unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.list().len(), 32);
        assert_eq!(store.running_count(), 0);
        assert!(store.list().iter().all(|s| s.completed_tracks == 10 && s.status == "completed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_jobs_expire() {
        let store = JobStore::new(RetentionPolicy {
            max_finished: 10,
            ttl: Duration::from_secs(60),
        });
        store.put(JobId::from("old"), details("/d"), JobProgress::default()).unwrap();
        store.put(JobId::from("live"), details("/d"), JobProgress::default()).unwrap();
        store.finish(&JobId::from("old"), ok_result()).unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(store.evict(), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(store.evict(), 1);
        assert!(store.get(&JobId::from("old")).is_none());
        assert!(store.get(&JobId::from("live")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_cap_drops_oldest_finished() {
        let store = JobStore::new(RetentionPolicy {
            max_finished: 2,
            ttl: Duration::from_secs(3600),
        });

        for name in ["first", "second", "third"] {
            let id = JobId::from(name);
            store.put(id.clone(), details("/d"), JobProgress::default()).unwrap();
            store.finish(&id, ok_result()).unwrap();
            tokio::time::advance(Duration::from_secs(1)).await;
        }

        assert!(store.get(&JobId::from("first")).is_none());
        assert!(store.get(&JobId::from("second")).is_some());
        assert!(store.get(&JobId::from("third")).is_some());
    }
}
