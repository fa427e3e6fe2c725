use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::models::job::{JobRecord, JobState};
use crate::services::registry::{JobRegistry, RegistryError};

/// Mirrors a ground-truth job into the facade record a client polls.
///
/// Runs until the ground-truth job reaches a terminal state (after copying
/// that final state) or until the facade is terminal on its own.
pub struct CrossRegistrySync {
    source: Arc<JobRegistry>,
    source_id: Uuid,
    target: Arc<JobRegistry>,
    target_id: Uuid,
    interval: Duration,
}

impl CrossRegistrySync {
    pub fn new(
        source: Arc<JobRegistry>,
        source_id: Uuid,
        target: Arc<JobRegistry>,
        target_id: Uuid,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            source_id,
            target,
            target_id,
            interval,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            if !self.sync_once().await {
                break;
            }
        }
        debug!(
            source_job_id = %self.source_id,
            target_job_id = %self.target_id,
            "Cross-registry sync finished"
        );
    }

    /// Copy the current ground-truth status once. Returns whether to keep
    /// polling.
    async fn sync_once(&self) -> bool {
        let truth = match self.source.get(self.source_id).await {
            Ok(record) => record,
            Err(RegistryError::NotFound(_)) => {
                warn!(source_job_id = %self.source_id, "Ground-truth job vanished");
                match self
                    .target
                    .update(self.target_id, |facade| {
                        facade.fail("linked processing job is no longer available")
                    })
                    .await
                {
                    Ok(_) => metrics::counter!("detector_jobs_failed_total").increment(1),
                    Err(RegistryError::Terminal { .. }) => {}
                    Err(e) => error!(
                        target_job_id = %self.target_id,
                        error = %e,
                        "Failed to record lost ground-truth job"
                    ),
                }
                return false;
            }
            Err(e) => {
                warn!(source_job_id = %self.source_id, error = %e, "Ground-truth read failed");
                return true;
            }
        };

        if let Ok(facade) = self.target.get(self.target_id).await {
            if facade.state.is_terminal() {
                return false;
            }
            if in_step(&facade, &truth) {
                return true;
            }
        }

        match self
            .target
            .update(self.target_id, |facade| facade.mirror(&truth))
            .await
        {
            Ok(_) => !truth.state.is_terminal(),
            Err(RegistryError::Terminal { .. }) | Err(RegistryError::NotFound(_)) => false,
            Err(e) => {
                warn!(target_job_id = %self.target_id, error = %e, "Failed to mirror job status");
                !truth.state.is_terminal()
            }
        }
    }
}

/// Whether mirroring `truth` would change nothing observable on `facade`.
fn in_step(facade: &JobRecord, truth: &JobRecord) -> bool {
    let state_matches = facade.state == truth.state
        || matches!(truth.state, JobState::Initializing | JobState::Downloading);
    state_matches
        && facade.progress_percent == truth.progress_percent
        && facade.frames_processed == truth.frames_processed
        && facade.frames_total == truth.frames_total
        && facade.detections == truth.detections
}
