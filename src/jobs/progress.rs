//! Best-effort progress extraction from the download tool's log output.
//!
//! The tool has no machine-readable progress channel, so lines are matched
//! against keywords. Phrasing changes in the tool will silently degrade the
//! structured fields; the raw lines are always kept.

use crate::jobs::{JobProgress, ProgressStatus};
use regex::Regex;
use std::sync::OnceLock;

/// Structured meaning of one output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    DownloadingTrack(String),
    TrackFinished,
    Failure(String),
    TracksFound(u32),
    Processing(String),
    Other,
}

/// Strategy turning a raw output line into a [`LineEvent`]
pub trait LineClassifier: Send + Sync {
    fn classify(&self, line: &str) -> LineEvent;
}

/// Keyword heuristics, checked in priority order, case-insensitively
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordLineClassifier;

fn first_integer(line: &str) -> Option<u32> {
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    NUMBER
        .get_or_init(|| Regex::new(r"\d+").ok())
        .as_ref()?
        .find(line)?
        .as_str()
        .parse()
        .ok()
}

impl LineClassifier for KeywordLineClassifier {
    fn classify(&self, line: &str) -> LineEvent {
        let lower = line.to_lowercase();

        if lower.contains("downloading") && lower.contains("track") {
            LineEvent::DownloadingTrack(line.to_string())
        } else if lower.contains("downloaded") || lower.contains("finished") {
            LineEvent::TrackFinished
        } else if lower.contains("error") || lower.contains("failed") {
            LineEvent::Failure(line.to_string())
        } else if lower.contains("tracks found") {
            first_integer(line).map(LineEvent::TracksFound).unwrap_or(LineEvent::Other)
        } else if lower.contains("processing") {
            LineEvent::Processing(line.to_string())
        } else {
            LineEvent::Other
        }
    }
}

impl JobProgress {
    /// Record `line` in the output buffer and apply its event
    pub fn apply(&mut self, line: &str, classifier: &dyn LineClassifier) {
        self.output_lines.push(line);

        match classifier.classify(line) {
            LineEvent::DownloadingTrack(track) => {
                self.current_track = track;
                self.status = ProgressStatus::Downloading;
            }
            LineEvent::TrackFinished => {
                self.completed_tracks = self.completed_tracks.saturating_add(1);
                self.status = ProgressStatus::Downloading;
            }
            LineEvent::Failure(line) => {
                self.current_track = format!("Error: {}", line);
                self.status = ProgressStatus::Error;
            }
            LineEvent::TracksFound(total) => self.total_tracks = total,
            LineEvent::Processing(line) => {
                self.current_track = line;
                self.status = ProgressStatus::Processing;
            }
            LineEvent::Other => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(line: &str) -> LineEvent {
        KeywordLineClassifier.classify(line)
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            classify("[INFO] Downloading track 3/12: Idioteque"),
            LineEvent::DownloadingTrack("[INFO] Downloading track 3/12: Idioteque".to_string())
        );
        assert_eq!(classify("Downloaded Idioteque.m4a"), LineEvent::TrackFinished);
        assert_eq!(classify("Finished!"), LineEvent::TrackFinished);
        assert_eq!(
            classify("[ERROR] Failed to get stream"),
            LineEvent::Failure("[ERROR] Failed to get stream".to_string())
        );
        assert_eq!(classify("12 tracks found"), LineEvent::TracksFound(12));
        assert_eq!(
            classify("Processing album Kid A"),
            LineEvent::Processing("Processing album Kid A".to_string())
        );
        assert_eq!(classify("Tracks found without a number"), LineEvent::Other);
        assert_eq!(classify("hello"), LineEvent::Other);
    }

    #[test]
    fn test_priority_order() {
        // "downloading" + "track" wins over "error"
        assert!(matches!(classify("Error while downloading track"), LineEvent::DownloadingTrack(_)));
        // "finished" wins over "failed"
        assert_eq!(classify("Finished with 1 failed"), LineEvent::TrackFinished);
    }

    #[test]
    fn test_apply_updates_fields() {
        let mut progress = JobProgress::default();
        progress.apply("24 tracks found", &KeywordLineClassifier);
        assert_eq!(progress.total_tracks, 24);

        progress.apply("Downloading track 1", &KeywordLineClassifier);
        assert_eq!(progress.status, ProgressStatus::Downloading);
        assert_eq!(progress.current_track, "Downloading track 1");

        progress.apply("Downloaded track 1", &KeywordLineClassifier);
        assert_eq!(progress.completed_tracks, 1);

        progress.apply("ERROR: token expired", &KeywordLineClassifier);
        assert_eq!(progress.status, ProgressStatus::Error);
        assert_eq!(progress.current_track, "Error: ERROR: token expired");

        progress.apply("just noise", &KeywordLineClassifier);
        assert_eq!(progress.status, ProgressStatus::Error);
        assert_eq!(progress.output_lines.iter().count(), 5);
    }

    #[test]
    fn test_completed_tracks_never_decrease() {
        let lines = [
            "Downloaded a", "3 tracks found", "Downloading track b", "error", "Finished b",
            "Processing c", "1 tracks found", "Downloaded c",
        ];

        let mut progress = JobProgress::default();
        let mut previous = 0;
        for line in lines.iter().cycle().take(400) {
            progress.apply(line, &KeywordLineClassifier);
            assert!(progress.completed_tracks >= previous);
            assert!(progress.output_lines.iter().count() <= 100);
            previous = progress.completed_tracks;
        }
        assert_eq!(progress.output_lines.iter().last(), Some("Downloaded c"));
    }
}
