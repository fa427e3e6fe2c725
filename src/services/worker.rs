use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::detection::{Detection, DetectionSummary};
use crate::models::job::{JobRecord, SourceKind};
use crate::services::accumulator::DetectionAccumulator;
use crate::services::acquisition::{AcquisitionError, Acquirer};
use crate::services::detector::{DetectionEngine, DetectionError};
use crate::services::export::{ResultExporter, VideoExport};
use crate::services::frames::{Frame, FrameError, MediaOpener};
use crate::services::orchestrator::OrchestratorSettings;
use crate::services::registry::{JobRegistry, RegistryError};
use crate::services::sync::CrossRegistrySync;

/// External collaborators a worker drives.
#[derive(Clone)]
pub struct Collaborators {
    pub opener: Arc<dyn MediaOpener>,
    pub detector: Arc<dyn DetectionEngine>,
    pub acquirer: Arc<dyn Acquirer>,
    pub exporter: Option<Arc<dyn ResultExporter>>,
}

/// Runs one job's pipeline: optional acquisition, the frame loop, and
/// finalisation.
///
/// Every `run_*` entry point is a failure boundary: errors and panics inside
/// the pipeline end as an `error` state on the job and never escape.
pub struct Worker {
    collaborators: Collaborators,
    settings: OrchestratorSettings,
}

/// The client-facing record of a remote job, kept alongside its ground truth.
struct Facade {
    registry: Arc<JobRegistry>,
    id: Uuid,
}

enum Outcome {
    Completed,
    /// The job became terminal under us (watchdog or sync); stop quietly.
    Abandoned,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to open media: {0}")]
    Open(#[source] FrameError),

    #[error("failed to decode video: {0}")]
    Decode(#[source] FrameError),

    #[error("acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl WorkerError {
    fn is_abandon(&self) -> bool {
        matches!(
            self,
            WorkerError::Registry(RegistryError::Terminal { .. } | RegistryError::NotFound(_))
        )
    }
}

#[derive(Serialize)]
struct Artifact<'a> {
    job_id: Uuid,
    display_name: &'a str,
    source_kind: SourceKind,
    fps: f64,
    frames_processed: u64,
    frames_total: u64,
    duration_secs: f64,
    summary: &'a DetectionSummary,
}

impl Worker {
    pub fn new(collaborators: Collaborators, settings: OrchestratorSettings) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    /// Analyze a file already on local disk.
    pub async fn run_local(self: Arc<Self>, registry: Arc<JobRegistry>, id: Uuid, path: PathBuf) {
        self.run_pipeline(registry, id, path, None).await;
    }

    async fn run_pipeline(
        self: Arc<Self>,
        registry: Arc<JobRegistry>,
        id: Uuid,
        path: PathBuf,
        facade: Option<Facade>,
    ) {
        let started = Instant::now();
        let worker = self.clone();
        let task_registry = registry.clone();
        let handle = tokio::spawn(async move {
            worker
                .process_file(&task_registry, id, &path, facade.as_ref())
                .await
        });

        let result = match handle.await {
            Ok(result) => result,
            Err(join_error) => {
                let message = panic_message(join_error);
                error!(registry = registry.name(), job_id = %id, panic = %message, "Worker panicked");
                fail_job(&registry, id, format!("worker panicked: {}", message)).await;
                return;
            }
        };

        match result {
            Ok(Outcome::Completed) => {
                metrics::counter!("detector_jobs_completed_total").increment(1);
                metrics::histogram!("detector_job_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
            }
            Ok(Outcome::Abandoned) => {
                info!(registry = registry.name(), job_id = %id, "Job became terminal, worker stopped");
            }
            Err(e) if e.is_abandon() => {
                info!(registry = registry.name(), job_id = %id, reason = %e, "Worker stopped");
            }
            Err(e) => {
                warn!(registry = registry.name(), job_id = %id, error = %e, "Job failed");
                fail_job(&registry, id, e.to_string()).await;
            }
        }
    }

    /// Acquire a remote video, then analyze it as a ground-truth job in
    /// `processing` while `remote` holds the facade record a client polls.
    pub async fn run_remote(
        self: Arc<Self>,
        remote: Arc<JobRegistry>,
        processing: Arc<JobRegistry>,
        facade_id: Uuid,
        url: String,
    ) {
        let worker = self.clone();
        let task_remote = remote.clone();
        let task_processing = processing.clone();
        let handle = tokio::spawn(async move {
            worker
                .acquire_and_link(&task_remote, &task_processing, facade_id, &url)
                .await
        });

        let linked = match handle.await {
            Ok(Ok(linked)) => linked,
            Ok(Err(e)) if e.is_abandon() => {
                info!(job_id = %facade_id, reason = %e, "Remote worker stopped");
                return;
            }
            Ok(Err(e)) => {
                warn!(job_id = %facade_id, error = %e, "Remote job failed");
                fail_job(&remote, facade_id, e.to_string()).await;
                return;
            }
            Err(join_error) => {
                let message = panic_message(join_error);
                error!(job_id = %facade_id, panic = %message, "Remote worker panicked");
                fail_job(&remote, facade_id, format!("worker panicked: {}", message)).await;
                return;
            }
        };

        let (truth_id, path) = linked;
        CrossRegistrySync::new(
            processing.clone(),
            truth_id,
            remote.clone(),
            facade_id,
            self.settings.sync_interval,
        )
        .spawn();

        let facade = Facade {
            registry: remote,
            id: facade_id,
        };
        self.run_pipeline(processing, truth_id, path, Some(facade))
            .await;
    }

    async fn acquire_and_link(
        &self,
        remote: &JobRegistry,
        processing: &JobRegistry,
        facade_id: Uuid,
        url: &str,
    ) -> Result<(Uuid, PathBuf), WorkerError> {
        remote.update(facade_id, |r| r.begin_download()).await?;

        let media = self.collaborators.acquirer.acquire(url).await?;

        let facade = remote
            .update(facade_id, |r| {
                if let Some(title) = media.title.as_ref().filter(|t| !t.trim().is_empty()) {
                    r.display_name = title.clone();
                }
                Ok(())
            })
            .await?;

        let truth = JobRecord::new(
            SourceKind::RemoteUrl,
            facade.display_name.clone(),
            media.path.display().to_string(),
        );
        let truth_id = processing.create(truth).await;

        remote
            .update(facade_id, |r| {
                r.linked_job_id = Some(truth_id);
                Ok(())
            })
            .await?;

        info!(
            job_id = %facade_id,
            linked_job_id = %truth_id,
            path = %media.path.display(),
            "Remote video acquired"
        );
        Ok((truth_id, media.path))
    }

    async fn process_file(
        &self,
        registry: &JobRegistry,
        id: Uuid,
        path: &Path,
        facade: Option<&Facade>,
    ) -> Result<Outcome, WorkerError> {
        let mut source = self
            .collaborators
            .opener
            .open(path)
            .await
            .map_err(WorkerError::Open)?;
        let info = source.info();

        registry
            .update(id, |r| r.begin_processing(info.frames_total, info.fps))
            .await?;
        info!(
            registry = registry.name(),
            job_id = %id,
            frames_total = info.frames_total,
            fps = info.fps,
            "Processing started"
        );

        let mut accumulator = DetectionAccumulator::new();
        let every = self.settings.progress_every_frames.max(1);

        loop {
            if registry.is_terminal(id) {
                return Ok(Outcome::Abandoned);
            }

            let frame = match source.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) if accumulator.frames_processed() == 0 => {
                    return Err(WorkerError::Decode(e));
                }
                Err(e) => {
                    warn!(
                        job_id = %id,
                        frames = accumulator.frames_processed(),
                        error = %e,
                        "Decode failed mid-stream, finishing with partial results"
                    );
                    break;
                }
            };

            let detections = match self.collaborators.detector.detect(&frame).await {
                Ok(detections) => self.accept(detections),
                Err(e) => {
                    warn!(job_id = %id, frame = frame.index, error = %e, "Detection failed, skipping frame");
                    Vec::new()
                }
            };

            accumulator.observe(frame.index, &detections);
            metrics::counter!("detector_frames_processed_total").increment(1);

            let processed = accumulator.frames_processed();
            if processed % every == 0 {
                let snapshot = accumulator.summarize(info.frames_total, info.fps);
                registry
                    .update(id, |r| r.record_progress(processed, snapshot))
                    .await?;
                debug!(job_id = %id, frames = processed, "Progress published");
            }
        }

        self.finalize(registry, id, &accumulator, facade).await
    }

    /// Detect on a single still image, with the same confidence filter as
    /// the frame loop.
    pub async fn detect_still(&self, image: image::RgbImage) -> Result<Vec<Detection>, DetectionError> {
        let frame = Frame { index: 0, image };
        let detections = self.collaborators.detector.detect(&frame).await?;
        Ok(self.accept(detections))
    }

    /// Keep detections strictly above the confidence threshold.
    fn accept(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections
            .into_iter()
            .filter(|d| d.confidence > self.settings.confidence_threshold)
            .collect()
    }

    async fn finalize(
        &self,
        registry: &JobRegistry,
        id: Uuid,
        accumulator: &DetectionAccumulator,
        facade: Option<&Facade>,
    ) -> Result<Outcome, WorkerError> {
        let record = registry.get(id).await?;
        if record.state.is_terminal() {
            return Ok(Outcome::Abandoned);
        }

        let processed = accumulator.frames_processed();
        let total = if record.frames_total > 0 {
            record.frames_total
        } else {
            processed
        };
        let summary = accumulator.summarize(total, record.fps);

        let (artifact_ref, artifact_warning) =
            match self.write_artifact(&record, processed, total, &summary).await {
                Ok(path) => (path.map(|p| p.display().to_string()), None),
                Err(e) => {
                    warn!(job_id = %id, error = %e, "Failed to write result artifact");
                    (None, Some(format!("artifact not written: {}", e)))
                }
            };

        let completed = registry
            .update(id, |r| r.complete(processed, summary, artifact_ref))
            .await?;
        info!(
            registry = registry.name(),
            job_id = %id,
            frames = processed,
            labels = completed.detections.len(),
            "Job completed"
        );

        if let Some(warning) = artifact_warning {
            add_warning(registry, id, facade, warning).await?;
        }

        if let Some(exporter) = &self.collaborators.exporter {
            match exporter.export(&VideoExport::from_record(&completed)).await {
                Ok(row_id) => debug!(job_id = %id, row_id, "Results exported"),
                Err(e) => {
                    metrics::counter!("detector_export_failures_total").increment(1);
                    warn!(job_id = %id, error = %e, "Result export failed");
                    add_warning(registry, id, facade, format!("export failed: {}", e)).await?;
                }
            }
        }

        Ok(Outcome::Completed)
    }

    async fn write_artifact(
        &self,
        record: &JobRecord,
        processed: u64,
        total: u64,
        summary: &DetectionSummary,
    ) -> Result<Option<PathBuf>, std::io::Error> {
        let Some(dir) = &self.settings.artifact_dir else {
            return Ok(None);
        };

        let artifact = Artifact {
            job_id: record.id,
            display_name: &record.display_name,
            source_kind: record.source_kind,
            fps: record.fps,
            frames_processed: processed,
            frames_total: total,
            duration_secs: record.duration_secs(total),
            summary,
        };

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.json", record.id));
        let payload = serde_json::to_vec_pretty(&artifact)?;
        tokio::fs::write(&path, payload).await?;
        Ok(Some(path))
    }
}

/// Record a non-fatal issue on the job and on the facade a client polls.
/// Sync copies status fields only, so the facade gets its own copy.
async fn add_warning(
    registry: &JobRegistry,
    id: Uuid,
    facade: Option<&Facade>,
    warning: String,
) -> Result<(), WorkerError> {
    if let Some(facade) = facade {
        if let Err(e) = facade.registry.add_warning(facade.id, warning.clone()).await {
            warn!(job_id = %facade.id, error = %e, "Failed to record warning on remote job");
        }
    }
    registry.add_warning(id, warning).await?;
    Ok(())
}

async fn fail_job(registry: &JobRegistry, id: Uuid, message: String) {
    match registry.update(id, |r| r.fail(message)).await {
        Ok(_) => {
            metrics::counter!("detector_jobs_failed_total").increment(1);
        }
        Err(RegistryError::Terminal { .. }) => {}
        Err(e) => {
            error!(registry = registry.name(), job_id = %id, error = %e, "Failed to record job error");
        }
    }
}

fn panic_message(join_error: tokio::task::JoinError) -> String {
    if !join_error.is_panic() {
        return join_error.to_string();
    }
    let payload = join_error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panic_message_extracts_payload() {
        let handle = tokio::spawn(async { panic!("decoder exploded") });
        let err = handle.await.unwrap_err();
        assert_eq!(panic_message(err), "decoder exploded");
    }

    #[test]
    fn test_terminal_registry_errors_abandon() {
        let err = WorkerError::Registry(RegistryError::NotFound(Uuid::new_v4()));
        assert!(err.is_abandon());
        let err = WorkerError::Acquisition(AcquisitionError::NoOutputFile);
        assert!(!err.is_abandon());
        assert!(err.to_string().starts_with("acquisition failed"));
    }
}
