use async_trait::async_trait;
use serde::Serialize;

use crate::models::detection::DetectionSummary;
use crate::models::job::{JobRecord, SourceKind};

/// Finalized result of one video, handed to relational persistence.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VideoExport {
    pub source_kind: SourceKind,
    pub display_name: String,
    pub fps: f64,
    pub total_duration_secs: f64,
    pub frames_total: u64,
    pub summary: DetectionSummary,
}

impl VideoExport {
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            source_kind: record.source_kind,
            display_name: record.display_name.clone(),
            fps: record.fps,
            total_duration_secs: record.duration_secs(record.frames_total),
            frames_total: record.frames_total,
            summary: record.detections.clone(),
        }
    }
}

/// Writes a finalized result somewhere durable and returns its row id.
#[async_trait]
pub trait ResultExporter: Send + Sync {
    async fn export(&self, video: &VideoExport) -> Result<i64, ExportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Export rejected: {0}")]
    Rejected(String),
}
