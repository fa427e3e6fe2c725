use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::detection::Detection;
use crate::models::job::{JobRecord, SourceKind};
use crate::services::detector::DetectionError;
use crate::services::registry::{JobRegistry, RegistryError};
use crate::services::store::DurableStore;
use crate::services::validation::{self, ValidationError};
use crate::services::watchdog::Watchdog;
use crate::services::worker::{Collaborators, Worker};

/// Tunables for workers, the pool, and the periodic loops.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Detections at or below this confidence are dropped.
    pub confidence_threshold: f32,
    pub progress_every_frames: u64,
    pub max_concurrent_jobs: usize,
    pub watchdog_period: Duration,
    pub stuck_job_timeout: Duration,
    pub sync_interval: Duration,
    /// Where per-job JSON reports go; `None` skips them.
    pub artifact_dir: Option<PathBuf>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            progress_every_frames: 10,
            max_concurrent_jobs: 4,
            watchdog_period: Duration::from_secs(60),
            stuck_job_timeout: Duration::from_secs(300),
            sync_interval: Duration::from_millis(500),
            artifact_dir: None,
        }
    }
}

/// Creates jobs, runs them on a bounded worker pool, and answers status
/// queries across both registries.
///
/// `processing` is the ground truth every frame pipeline writes to. Remote
/// jobs are tracked by a facade record in `remote`, kept current by a
/// [`CrossRegistrySync`](crate::services::sync::CrossRegistrySync).
pub struct JobOrchestrator {
    processing: Arc<JobRegistry>,
    remote: Arc<JobRegistry>,
    worker: Arc<Worker>,
    permits: Arc<Semaphore>,
    settings: OrchestratorSettings,
}

impl JobOrchestrator {
    pub fn new(
        processing_store: Arc<dyn DurableStore>,
        remote_store: Arc<dyn DurableStore>,
        collaborators: Collaborators,
        settings: OrchestratorSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1)));
        Self {
            processing: Arc::new(JobRegistry::new("uploads", processing_store)),
            remote: Arc::new(JobRegistry::new("remote", remote_store)),
            worker: Arc::new(Worker::new(collaborators, settings.clone())),
            permits,
            settings,
        }
    }

    pub fn processing_registry(&self) -> &Arc<JobRegistry> {
        &self.processing
    }

    pub fn remote_registry(&self) -> &Arc<JobRegistry> {
        &self.remote
    }

    /// Start analyzing a file already saved on local disk. Returns as soon as
    /// the `initializing` record exists.
    pub async fn start_local(
        &self,
        path: PathBuf,
        display_name: impl Into<String>,
    ) -> Result<JobRecord, OrchestratorError> {
        let record = JobRecord::new(
            SourceKind::LocalUpload,
            display_name,
            path.display().to_string(),
        );
        let snapshot = record.clone();
        let id = self.processing.create(record).await;
        metrics::counter!("detector_jobs_started_total", "source" => "local_upload").increment(1);
        info!(job_id = %id, path = %path.display(), "Local job created");

        let worker = self.worker.clone();
        let registry = self.processing.clone();
        self.spawn_pooled(id, async move {
            worker.run_local(registry, id, path).await;
        });
        Ok(snapshot)
    }

    /// Start analyzing a remote video. The returned record is the facade a
    /// client polls.
    pub async fn start_remote(
        &self,
        url: &str,
        display_name: Option<String>,
    ) -> Result<JobRecord, OrchestratorError> {
        validation::validate_remote_url(url)?;

        let name = display_name.unwrap_or_else(|| url.to_string());
        let record = JobRecord::new(SourceKind::RemoteUrl, name, url);
        let snapshot = record.clone();
        let id = self.remote.create(record).await;
        metrics::counter!("detector_jobs_started_total", "source" => "remote_url").increment(1);
        info!(job_id = %id, url = %url, "Remote job created");

        let worker = self.worker.clone();
        let remote = self.remote.clone();
        let processing = self.processing.clone();
        let url = url.to_string();
        self.spawn_pooled(id, async move {
            worker.run_remote(remote, processing, id, url).await;
        });
        Ok(snapshot)
    }

    /// Run the detection engine on one image, outside the job machinery.
    pub async fn detect_image(&self, image: image::RgbImage) -> Result<Vec<Detection>, DetectionError> {
        let detections = self.worker.detect_still(image).await?;
        metrics::counter!("detector_images_analyzed_total").increment(1);
        Ok(detections)
    }

    /// Run `job` once a pool slot is free. Until then the job waits in
    /// `initializing`.
    fn spawn_pooled<F>(&self, id: Uuid, job: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(job_id = %id, "Worker pool closed, job not started");
                    return;
                }
            };
            metrics::gauge!("detector_active_jobs").increment(1.0);
            job.await;
            metrics::gauge!("detector_active_jobs").decrement(1.0);
        });
    }

    /// Wait until no worker holds a pool slot, so exports that run after
    /// `completed` have finished.
    pub async fn wait_idle(&self) {
        let slots = self.settings.max_concurrent_jobs.max(1) as u32;
        let _all = self.permits.acquire_many(slots).await;
    }

    /// Current record for `id`, facade registry first. Falls back to the
    /// durable stores after a restart; unknown ids are `NotFound`.
    pub async fn status(&self, id: Uuid) -> Result<JobRecord, OrchestratorError> {
        match self.remote.get(id).await {
            Ok(record) => return Ok(record),
            Err(RegistryError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.processing.get(id).await.map_err(OrchestratorError::from)
    }

    /// Non-terminal jobs across both registries, oldest first. Ground-truth
    /// records behind a facade are not listed twice.
    pub fn active_jobs(&self) -> Vec<JobRecord> {
        let facades = self.remote.list_active();
        let linked: Vec<Uuid> = facades.iter().filter_map(|r| r.linked_job_id).collect();

        let mut jobs: Vec<JobRecord> = self
            .processing
            .list_active()
            .into_iter()
            .filter(|r| !linked.contains(&r.id))
            .chain(facades)
            .collect();
        jobs.sort_by_key(|r| r.created_at);
        jobs
    }

    /// Whether job snapshots of both registries are reaching their durable
    /// stores.
    pub fn store_health(&self) -> Result<(), String> {
        for registry in [&self.processing, &self.remote] {
            registry
                .store_health()
                .map_err(|e| format!("{} registry: {}", registry.name(), e))?;
        }
        Ok(())
    }

    /// Build the watchdog over both registries.
    pub fn watchdog(&self) -> Watchdog {
        Watchdog::new(
            vec![self.processing.clone(), self.remote.clone()],
            self.settings.watchdog_period,
            self.settings.stuck_job_timeout,
        )
    }

    pub fn spawn_watchdog(&self) -> JoinHandle<()> {
        self.watchdog().spawn()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Registry(RegistryError),
}

impl OrchestratorError {
    /// The job may exist but its record could not be loaded.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, OrchestratorError::Registry(RegistryError::Store { .. }))
    }
}

impl From<RegistryError> for OrchestratorError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(id) => OrchestratorError::NotFound(id),
            other => OrchestratorError::Registry(other),
        }
    }
}
