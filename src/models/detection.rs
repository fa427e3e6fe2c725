use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One labeled object returned by the detection engine for a single frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub label: String,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in frame pixel coordinates.
    pub bbox: [f32; 4],
}

/// Per-label aggregate over all frames observed so far.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelSummary {
    /// Raw detection count; a label detected twice in one frame counts twice.
    pub detections: u64,
    /// Number of distinct frames the label appeared in.
    pub frames: u64,
    pub first_frame: u64,
    pub last_frame: u64,
    pub first_seen_secs: f64,
    pub last_seen_secs: f64,
    pub seconds_visible: f64,
    pub percentage_of_frames: f64,
    pub percentage_of_video_time: f64,
}

/// Label → summary. Empty means "no detections", never an error.
pub type DetectionSummary = BTreeMap<String, LabelSummary>;
