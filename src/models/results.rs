use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One stored per-label row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoDetectionRow {
    pub label_name: String,
    pub qty_frames_detected: i64,
    pub frame_per_second: f64,
    pub frames_appearance_in_percentage: f64,
}

/// A finalized video as stored in the results database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVideo {
    pub id: i64,
    #[serde(rename = "type")]
    pub video_type: String,
    pub name: String,
    pub fps: f64,
    pub total_video_time_secs: f64,
    pub created_at: DateTime<Utc>,
}

/// A stored video with its per-label rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoResult {
    #[serde(flatten)]
    pub video: StoredVideo,
    pub detections: Vec<LogoDetectionRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelTotals {
    pub total_frames_detected: i64,
    pub videos_with_label: i64,
}

/// Totals across every exported video. Placeholder rows for videos without
/// detections are not counted as a label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultStats {
    pub total_videos: i64,
    pub total_duration_secs: f64,
    pub labels: BTreeMap<String, LabelTotals>,
}
