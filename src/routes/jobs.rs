use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{ErrorResponse, JobStatusResponse, RemoteJobRequest, StartJobResponse};
use crate::services::orchestrator::OrchestratorError;
use crate::services::validation;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        let status = match &e {
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            e if e.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            OrchestratorError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        api_error(status, e.to_string())
    }
}

/// POST /api/v1/jobs/upload — Upload a video and start analyzing it.
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<StartJobResponse>), ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "file field has no filename"))?;
            let data = field
                .bytes()
                .await
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
            upload = Some((filename, data.to_vec()));
        }
    }

    let (filename, data) =
        upload.ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "missing multipart field 'file'"))?;

    validation::validate_upload(&filename, data.len(), state.max_upload_bytes).map_err(|e| {
        let status = match e {
            validation::ValidationError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        };
        api_error(status, e.to_string())
    })?;

    let stored = state.upload_dir.join(format!(
        "{}_{}",
        Uuid::new_v4(),
        validation::sanitize_filename(&filename)
    ));
    let write = async {
        tokio::fs::create_dir_all(&state.upload_dir).await?;
        tokio::fs::write(&stored, &data).await
    };
    if let Err(e) = write.await {
        warn!(path = %stored.display(), error = %e, "Failed to store upload");
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to store uploaded file",
        ));
    }
    info!(path = %stored.display(), bytes = data.len(), "Upload stored");

    let record = state.orchestrator.start_local(stored, filename).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StartJobResponse {
            job_id: record.id,
            status: record.state,
            message: "Video accepted for analysis".to_string(),
        }),
    ))
}

/// POST /api/v1/jobs/remote — Fetch a video from a URL and analyze it.
pub async fn start_remote_job(
    State(state): State<AppState>,
    Json(request): Json<RemoteJobRequest>,
) -> Result<(StatusCode, Json<StartJobResponse>), ApiError> {
    request
        .validate()
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    let record = state
        .orchestrator
        .start_remote(&request.url, request.name)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StartJobResponse {
            job_id: record.id,
            status: record.state,
            message: "Remote video queued for download and analysis".to_string(),
        }),
    ))
}

/// GET /api/v1/jobs/{job_id} — Current status of a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let record = state.orchestrator.status(job_id).await?;
    Ok(Json(record.into()))
}

/// GET /api/v1/jobs — Jobs that have not finished yet.
pub async fn list_active_jobs(State(state): State<AppState>) -> Json<Vec<JobStatusResponse>> {
    Json(
        state
            .orchestrator
            .active_jobs()
            .into_iter()
            .map(JobStatusResponse::from)
            .collect(),
    )
}
