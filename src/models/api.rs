use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::detection::Detection;
use crate::models::job::{JobRecord, JobState};

/// Request to analyze a video fetched from a remote URL.
#[derive(Debug, Deserialize, Validate)]
pub struct RemoteJobRequest {
    #[garde(url, length(min = 1, max = 2048))]
    pub url: String,

    #[garde(length(min = 1, max = 200))]
    pub name: Option<String>,
}

/// Response after starting a job. Returned before any work has happened.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartJobResponse {
    pub job_id: Uuid,
    pub status: JobState,
    pub message: String,
}

/// Response for querying job status.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    #[serde(flatten)]
    pub record: JobRecord,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.id,
            record,
        }
    }
}

/// Result of running detection on a single uploaded image.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageDetectionResponse {
    pub logo_detected: bool,
    pub detections: Vec<Detection>,
}

/// Paging for the stored results list.
#[derive(Debug, Deserialize, Validate)]
pub struct ListResultsQuery {
    #[garde(range(min = 1, max = 500))]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
