use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use sqlx::PgPool;
use tracing::warn;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::api::ListResultsQuery;
use crate::models::results::{ResultStats, StoredVideo, VideoResult};
use crate::routes::jobs::{api_error, ApiError};

const DEFAULT_LIST_LIMIT: i64 = 50;

fn results_db(state: &AppState) -> Result<&PgPool, ApiError> {
    state.db.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "results database is not configured",
        )
    })
}

fn read_failed(e: sqlx::Error) -> ApiError {
    warn!(error = %e, "Failed to read stored results");
    api_error(StatusCode::SERVICE_UNAVAILABLE, "failed to read stored results")
}

/// GET /api/v1/results — Exported videos, newest first.
pub async fn list_results(
    State(state): State<AppState>,
    Query(params): Query<ListResultsQuery>,
) -> Result<Json<Vec<StoredVideo>>, ApiError> {
    params
        .validate()
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    let pool = results_db(&state)?;

    let videos = queries::list_videos(pool, params.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await
        .map_err(read_failed)?;
    Ok(Json(videos))
}

/// GET /api/v1/results/{video_id} — One exported video with its label rows.
pub async fn get_result(
    State(state): State<AppState>,
    Path(video_id): Path<i64>,
) -> Result<Json<VideoResult>, ApiError> {
    let pool = results_db(&state)?;

    queries::get_video_result(pool, video_id)
        .await
        .map_err(read_failed)?
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("Result {} not found", video_id),
            )
        })
}

/// GET /api/v1/stats — Totals across all exported videos.
pub async fn result_stats(State(state): State<AppState>) -> Result<Json<ResultStats>, ApiError> {
    let pool = results_db(&state)?;
    let stats = queries::get_result_stats(pool).await.map_err(read_failed)?;
    Ok(Json(stats))
}
