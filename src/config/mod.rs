use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::orchestrator::OrchestratorSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Result export is disabled without it.
    pub database_url: Option<String>,

    /// Redis connection string for job snapshots. Falls back to JSON files.
    pub redis_url: Option<String>,

    /// Directory holding the JSON job snapshots, one file per registry.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Detection service endpoint
    #[serde(default = "default_detector_url")]
    pub detector_url: String,

    /// Bearer token for the detection service
    pub detector_token: Option<String>,

    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    #[serde(default = "default_progress_every_frames")]
    pub progress_every_frames: u64,

    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    #[serde(default = "default_watchdog_period_secs")]
    pub watchdog_period_secs: u64,

    #[serde(default = "default_stuck_job_timeout_secs")]
    pub stuck_job_timeout_secs: u64,

    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    #[serde(default = "default_acquisition_timeout_secs")]
    pub acquisition_timeout_secs: u64,

    /// Upload size limit in bytes (50 MB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: PathBuf,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("data/jobs")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("data/uploads")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("data/uploads/remote")
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("data/artifacts")
}

fn default_detector_url() -> String {
    "http://127.0.0.1:8001/detect".to_string()
}

fn default_confidence_threshold() -> f32 {
    0.5
}

fn default_progress_every_frames() -> u64 {
    10
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_watchdog_period_secs() -> u64 {
    60
}

fn default_stuck_job_timeout_secs() -> u64 {
    300
}

fn default_sync_interval_ms() -> u64 {
    500
}

fn default_acquisition_timeout_secs() -> u64 {
    1800
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_ytdlp_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            confidence_threshold: self.confidence_threshold,
            progress_every_frames: self.progress_every_frames,
            max_concurrent_jobs: self.max_concurrent_jobs,
            watchdog_period: Duration::from_secs(self.watchdog_period_secs),
            stuck_job_timeout: Duration::from_secs(self.stuck_job_timeout_secs),
            sync_interval: Duration::from_millis(self.sync_interval_ms),
            artifact_dir: Some(self.artifact_dir.clone()),
        }
    }

    pub fn acquisition_timeout(&self) -> Duration {
        Duration::from_secs(self.acquisition_timeout_secs)
    }
}
