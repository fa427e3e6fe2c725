use std::collections::{BTreeSet, HashMap};

use crate::models::detection::{Detection, DetectionSummary, LabelSummary};

#[derive(Debug, Default)]
struct LabelState {
    detections: u64,
    frames_with_label: BTreeSet<u64>,
    first_frame: u64,
    last_frame: u64,
}

/// Folds per-frame detections into running per-label statistics.
///
/// Owned by a single worker; never shared.
#[derive(Debug, Default)]
pub struct DetectionAccumulator {
    labels: HashMap<String, LabelState>,
    frames_processed: u64,
}

impl DetectionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame's (already filtered) detections.
    pub fn observe(&mut self, frame_index: u64, detections: &[Detection]) {
        self.frames_processed += 1;

        for detection in detections {
            let state = self
                .labels
                .entry(detection.label.clone())
                .or_insert_with(|| LabelState {
                    first_frame: frame_index,
                    last_frame: frame_index,
                    ..Default::default()
                });

            state.detections += 1;
            state.frames_with_label.insert(frame_index);
            state.first_frame = state.first_frame.min(frame_index);
            state.last_frame = state.last_frame.max(frame_index);
        }
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Build the per-label report.
    ///
    /// `total_frames` and `fps` describe the whole video; either being zero
    /// yields a video-time percentage of 0.
    pub fn summarize(&self, total_frames: u64, fps: f64) -> DetectionSummary {
        self.labels
            .iter()
            .map(|(label, state)| {
                let frames = state.frames_with_label.len() as u64;

                let percentage_of_frames = if self.frames_processed > 0 {
                    frames as f64 / self.frames_processed as f64 * 100.0
                } else {
                    0.0
                };

                let (seconds_visible, percentage_of_video_time) = if fps > 0.0 && total_frames > 0 {
                    let visible = frames as f64 / fps;
                    let duration = total_frames as f64 / fps;
                    (visible, (visible / duration * 100.0).min(100.0))
                } else {
                    (0.0, 0.0)
                };

                let at = |frame: u64| if fps > 0.0 { frame as f64 / fps } else { 0.0 };

                (
                    label.clone(),
                    LabelSummary {
                        detections: state.detections,
                        frames,
                        first_frame: state.first_frame,
                        last_frame: state.last_frame,
                        first_seen_secs: at(state.first_frame),
                        last_seen_secs: at(state.last_frame),
                        seconds_visible,
                        percentage_of_frames,
                        percentage_of_video_time,
                    },
                )
            })
            .collect()
    }
}
