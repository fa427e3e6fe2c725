//! In-process fakes for the orchestrator's collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use image::RgbImage;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use brand_detector::models::detection::Detection;
use brand_detector::models::job::JobRecord;
use brand_detector::services::acquisition::{AcquiredMedia, AcquisitionError, Acquirer};
use brand_detector::services::detector::{DetectionEngine, DetectionError};
use brand_detector::services::export::{ExportError, ResultExporter, VideoExport};
use brand_detector::services::frames::{Frame, FrameError, FrameSource, MediaOpener, VideoInfo};
use brand_detector::services::orchestrator::{JobOrchestrator, OrchestratorSettings};
use brand_detector::services::store::{DurableStore, MemoryStore};
use brand_detector::services::worker::Collaborators;

pub fn detection(label: &str, confidence: f32) -> Detection {
    Detection {
        label: label.to_string(),
        confidence,
        bbox: [0.0, 0.0, 16.0, 16.0],
    }
}

// ────────── Frame source ──────────

/// Serves `frames` tiny frames; optionally fails to decode at `fail_at`.
#[derive(Clone)]
pub struct ScriptedOpener {
    pub fps: f64,
    pub frames: u64,
    /// What the container claims; defaults to `frames`.
    pub reported_total: Option<u64>,
    pub fail_at: Option<u64>,
}

impl ScriptedOpener {
    pub fn new(frames: u64, fps: f64) -> Self {
        Self {
            fps,
            frames,
            reported_total: None,
            fail_at: None,
        }
    }

    pub fn failing_at(mut self, frame: u64) -> Self {
        self.fail_at = Some(frame);
        self
    }
}

struct ScriptedSource {
    script: ScriptedOpener,
    next: u64,
}

#[async_trait]
impl FrameSource for ScriptedSource {
    fn info(&self) -> VideoInfo {
        VideoInfo {
            fps: self.script.fps,
            frames_total: self.script.reported_total.unwrap_or(self.script.frames),
            width: 2,
            height: 2,
        }
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        if self.script.fail_at == Some(self.next) {
            return Err(FrameError::Decode(format!("corrupt frame {}", self.next)));
        }
        if self.next >= self.script.frames {
            return Ok(None);
        }
        let frame = Frame {
            index: self.next,
            image: RgbImage::new(2, 2),
        };
        self.next += 1;
        Ok(Some(frame))
    }
}

#[async_trait]
impl MediaOpener for ScriptedOpener {
    async fn open(&self, _path: &Path) -> Result<Box<dyn FrameSource>, FrameError> {
        Ok(Box::new(ScriptedSource {
            script: self.clone(),
            next: 0,
        }))
    }
}

// ────────── Detection engine ──────────

/// Returns scripted detections per frame index.
#[derive(Default)]
pub struct ScriptedDetector {
    pub by_frame: HashMap<u64, Vec<Detection>>,
    pub fail_on: HashSet<u64>,
    pub panic_on: Option<u64>,
    /// When set, every call waits for a permit first.
    pub gate: Option<Arc<Semaphore>>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same detections on every frame in `frames`.
    pub fn on_frames(mut self, frames: impl IntoIterator<Item = u64>, detections: Vec<Detection>) -> Self {
        for frame in frames {
            self.by_frame
                .entry(frame)
                .or_default()
                .extend(detections.iter().cloned());
        }
        self
    }
}

#[async_trait]
impl DetectionEngine for ScriptedDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.map_err(|e| DetectionError::Status {
                status: 503,
                body: e.to_string(),
            })?;
        }
        if self.panic_on == Some(frame.index) {
            panic!("detector crashed on frame {}", frame.index);
        }
        if self.fail_on.contains(&frame.index) {
            return Err(DetectionError::Status {
                status: 500,
                body: "inference failed".to_string(),
            });
        }
        Ok(self.by_frame.get(&frame.index).cloned().unwrap_or_default())
    }
}

/// Never answers.
pub struct HangingDetector;

#[async_trait]
impl DetectionEngine for HangingDetector {
    async fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
}

// ────────── Acquisition ──────────

pub struct FailingAcquirer;

#[async_trait]
impl Acquirer for FailingAcquirer {
    async fn acquire(&self, _url: &str) -> Result<AcquiredMedia, AcquisitionError> {
        Err(AcquisitionError::Failed("ERROR: Video unavailable".to_string()))
    }
}

/// Pretends every URL downloads to `path`.
pub struct StaticAcquirer {
    pub path: PathBuf,
    pub title: Option<String>,
}

#[async_trait]
impl Acquirer for StaticAcquirer {
    async fn acquire(&self, _url: &str) -> Result<AcquiredMedia, AcquisitionError> {
        Ok(AcquiredMedia {
            path: self.path.clone(),
            title: self.title.clone(),
        })
    }
}

// ────────── Export ──────────

#[derive(Default)]
pub struct RecordingExporter {
    pub exports: Mutex<Vec<VideoExport>>,
    pub fail: bool,
}

impl RecordingExporter {
    pub fn failing() -> Self {
        Self {
            exports: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn recorded(&self) -> Vec<VideoExport> {
        self.exports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultExporter for RecordingExporter {
    async fn export(&self, video: &VideoExport) -> Result<i64, ExportError> {
        if self.fail {
            return Err(ExportError::Rejected("database unavailable".to_string()));
        }
        let mut exports = self.exports.lock().unwrap();
        exports.push(video.clone());
        Ok(exports.len() as i64)
    }
}

// ────────── Orchestrator setup ──────────

pub fn test_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        progress_every_frames: 10,
        sync_interval: Duration::from_millis(10),
        ..OrchestratorSettings::default()
    }
}

pub struct Harness {
    pub opener: Arc<dyn MediaOpener>,
    pub detector: Arc<dyn DetectionEngine>,
    pub acquirer: Arc<dyn Acquirer>,
    pub exporter: Option<Arc<dyn ResultExporter>>,
    pub settings: OrchestratorSettings,
    pub processing_store: Arc<dyn DurableStore>,
    pub remote_store: Arc<dyn DurableStore>,
}

impl Harness {
    pub fn new(opener: ScriptedOpener, detector: impl DetectionEngine + 'static) -> Self {
        Self {
            opener: Arc::new(opener),
            detector: Arc::new(detector),
            acquirer: Arc::new(FailingAcquirer),
            exporter: None,
            settings: test_settings(),
            processing_store: Arc::new(MemoryStore::new()),
            remote_store: Arc::new(MemoryStore::new()),
        }
    }

    pub fn build(&self) -> JobOrchestrator {
        JobOrchestrator::new(
            self.processing_store.clone(),
            self.remote_store.clone(),
            Collaborators {
                opener: self.opener.clone(),
                detector: self.detector.clone(),
                acquirer: self.acquirer.clone(),
                exporter: self.exporter.clone(),
            },
            self.settings.clone(),
        )
    }
}

/// Poll until the job is terminal, giving up after a few seconds.
pub async fn wait_for_terminal(orchestrator: &JobOrchestrator, id: Uuid) -> JobRecord {
    for _ in 0..500 {
        let record = orchestrator.status(id).await.expect("job should exist");
        if record.state.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish in time", id);
}

/// Poll until `check` holds for the job record.
pub async fn wait_until(
    orchestrator: &JobOrchestrator,
    id: Uuid,
    check: impl Fn(&JobRecord) -> bool,
) -> JobRecord {
    for _ in 0..500 {
        let record = orchestrator.status(id).await.expect("job should exist");
        if check(&record) {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached the expected condition", id);
}
