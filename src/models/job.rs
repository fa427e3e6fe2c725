use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::detection::DetectionSummary;

/// Lifecycle state of an analysis job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Initializing,
    Downloading,
    Processing,
    Completed,
    Error,
}

impl JobState {
    /// `completed` and `error` are never left once entered.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Error)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// `processing -> processing` is the progress self-loop; every other
    /// move is strictly forward.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Initializing, Downloading | Processing | Error) => true,
            (Downloading, Processing | Error) => true,
            (Processing, Processing | Completed | Error) => true,
            _ => false,
        }
    }
}

/// How the media for a job is acquired.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceKind {
    LocalUpload,
    RemoteUrl,
}

/// One logical unit of work, as held by a `JobRegistry`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub id: Uuid,
    pub state: JobState,
    pub source_kind: SourceKind,
    pub display_name: String,
    /// Uploaded file path or remote URL.
    pub source_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub progress_percent: f64,
    pub frames_processed: u64,
    pub frames_total: u64,
    pub fps: f64,
    pub detections: DetectionSummary,
    pub error_message: Option<String>,
    pub artifact_ref: Option<String>,
    /// Ground-truth job this facade record mirrors, if any.
    pub linked_job_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub state_history: Vec<JobState>,
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransitionError {
    #[error("invalid transition from {from} to {to}")]
    Invalid { from: JobState, to: JobState },

    #[error("local uploads never enter the downloading state")]
    DownloadNotApplicable,

    #[error("an error transition requires a non-empty message")]
    MissingErrorMessage,

    #[error("job is not stuck")]
    NotStuck,
}

impl JobRecord {
    pub fn new(source_kind: SourceKind, display_name: impl Into<String>, source_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            state: JobState::Initializing,
            source_kind,
            display_name: display_name.into(),
            source_ref: source_ref.into(),
            created_at: now,
            updated_at: now,
            ended_at: None,
            progress_percent: 0.0,
            frames_processed: 0,
            frames_total: 0,
            fps: 0.0,
            detections: DetectionSummary::new(),
            error_message: None,
            artifact_ref: None,
            linked_job_id: None,
            warnings: Vec::new(),
            state_history: vec![JobState::Initializing],
            revision: 0,
        }
    }

    fn enter(&mut self, next: JobState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError::Invalid {
                from: self.state,
                to: next,
            });
        }
        if self.state != next {
            self.state_history.push(next);
        }
        self.state = next;
        Ok(())
    }

    pub fn begin_download(&mut self) -> Result<(), TransitionError> {
        if self.source_kind == SourceKind::LocalUpload {
            return Err(TransitionError::DownloadNotApplicable);
        }
        self.enter(JobState::Downloading)?;
        self.progress_percent = 0.0;
        Ok(())
    }

    pub fn begin_processing(&mut self, frames_total: u64, fps: f64) -> Result<(), TransitionError> {
        if self.state == JobState::Processing {
            return Err(TransitionError::Invalid {
                from: self.state,
                to: JobState::Processing,
            });
        }
        self.enter(JobState::Processing)?;
        self.frames_total = frames_total;
        self.fps = fps;
        self.progress_percent = 0.0;
        Ok(())
    }

    /// Publish a progress snapshot. Progress never moves backwards.
    pub fn record_progress(
        &mut self,
        frames_processed: u64,
        detections: DetectionSummary,
    ) -> Result<(), TransitionError> {
        if self.state != JobState::Processing {
            return Err(TransitionError::Invalid {
                from: self.state,
                to: JobState::Processing,
            });
        }
        self.frames_processed = frames_processed;
        let percent = if self.frames_total > 0 {
            (frames_processed as f64 / self.frames_total as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        self.progress_percent = self.progress_percent.max(percent);
        self.detections = detections;
        Ok(())
    }

    pub fn complete(
        &mut self,
        frames_processed: u64,
        detections: DetectionSummary,
        artifact_ref: Option<String>,
    ) -> Result<(), TransitionError> {
        self.enter(JobState::Completed)?;
        self.frames_processed = frames_processed;
        if self.frames_total == 0 {
            self.frames_total = frames_processed;
        }
        self.progress_percent = 100.0;
        self.detections = detections;
        self.artifact_ref = artifact_ref;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(TransitionError::MissingErrorMessage);
        }
        self.enter(JobState::Error)?;
        self.error_message = Some(message);
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Seconds of video covered by `frames` at the record's frame rate.
    pub fn duration_secs(&self, frames: u64) -> f64 {
        if self.fps > 0.0 {
            frames as f64 / self.fps
        } else {
            0.0
        }
    }

    /// A processing job with no recorded progress whose last update is older
    /// than `timeout`.
    ///
    /// When the frame count is unknown `progress_percent` stays 0, so published
    /// frames count as progress too.
    pub fn is_stuck(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.state == JobState::Processing
            && self.progress_percent <= 0.0
            && self.frames_processed == 0
            && now - self.updated_at > timeout
    }

    /// Copy the observable status of a ground-truth record into this facade.
    pub fn mirror(&mut self, source: &JobRecord) -> Result<(), TransitionError> {
        match source.state {
            // Nothing observable yet; the facade keeps its own state.
            JobState::Initializing | JobState::Downloading => {}
            JobState::Processing => self.enter(JobState::Processing)?,
            JobState::Completed => {
                if self.state != JobState::Processing {
                    self.enter(JobState::Processing)?;
                }
                self.enter(JobState::Completed)?;
            }
            JobState::Error => {
                let message = source
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "linked job failed".to_string());
                return self.fail(message);
            }
        }
        self.progress_percent = source.progress_percent;
        self.frames_processed = source.frames_processed;
        self.frames_total = source.frames_total;
        self.fps = source.fps;
        self.detections = source.detections.clone();
        if source.state == JobState::Completed {
            self.artifact_ref = source.artifact_ref.clone();
            self.ended_at = source.ended_at;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Error.is_terminal());
        assert!(!JobState::Processing.is_terminal());
        assert!(!JobState::Completed.can_transition_to(JobState::Processing));
        assert!(!JobState::Error.can_transition_to(JobState::Completed));
    }

    #[test]
    fn test_local_upload_cannot_download() {
        let mut record = JobRecord::new(SourceKind::LocalUpload, "clip.mp4", "/tmp/clip.mp4");
        assert_eq!(record.begin_download(), Err(TransitionError::DownloadNotApplicable));
        assert_eq!(record.state, JobState::Initializing);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut record = JobRecord::new(SourceKind::LocalUpload, "clip.mp4", "/tmp/clip.mp4");
        record.begin_processing(100, 25.0).unwrap();
        record.record_progress(40, DetectionSummary::new()).unwrap();
        assert_eq!(record.progress_percent, 40.0);
        record.record_progress(30, DetectionSummary::new()).unwrap();
        assert_eq!(record.progress_percent, 40.0);
    }

    #[test]
    fn test_fail_requires_message() {
        let mut record = JobRecord::new(SourceKind::RemoteUrl, "video", "https://example.com/v");
        assert_eq!(record.fail("  "), Err(TransitionError::MissingErrorMessage));
        record.fail("download failed").unwrap();
        assert_eq!(record.state, JobState::Error);
        assert!(record.ended_at.is_some());
    }

    #[test]
    fn test_complete_sets_full_progress() {
        let mut record = JobRecord::new(SourceKind::LocalUpload, "clip.mp4", "/tmp/clip.mp4");
        record.begin_processing(0, 30.0).unwrap();
        record.complete(12, DetectionSummary::new(), None).unwrap();
        assert_eq!(record.progress_percent, 100.0);
        assert_eq!(record.frames_total, 12);
        assert_eq!(
            record.state_history,
            vec![JobState::Initializing, JobState::Processing, JobState::Completed]
        );
    }

    #[test]
    fn test_state_display_roundtrip() {
        assert_eq!(JobState::Downloading.to_string(), "downloading");
        assert_eq!("completed".parse::<JobState>().unwrap(), JobState::Completed);
        assert_eq!(SourceKind::RemoteUrl.to_string(), "remote_url");
    }

    #[test]
    fn test_mirror_copies_progress_and_terminal_state() {
        let mut facade = JobRecord::new(SourceKind::RemoteUrl, "video", "https://example.com/v");
        facade.begin_download().unwrap();

        let mut truth = JobRecord::new(SourceKind::RemoteUrl, "video", "/tmp/v.mp4");
        truth.begin_processing(10, 10.0).unwrap();
        truth.record_progress(5, DetectionSummary::new()).unwrap();

        facade.mirror(&truth).unwrap();
        assert_eq!(facade.state, JobState::Processing);
        assert_eq!(facade.progress_percent, 50.0);

        truth.fail("decoder crashed").unwrap();
        facade.mirror(&truth).unwrap();
        assert_eq!(facade.state, JobState::Error);
        assert_eq!(facade.error_message.as_deref(), Some("decoder crashed"));
    }
}
