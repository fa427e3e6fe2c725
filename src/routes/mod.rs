pub mod detect;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod results;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Multipart framing on top of the raw file bytes.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// API routes with the standard layer stack. `/metrics` is added by the
/// binary since it needs the recorder handle.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/jobs", get(jobs::list_active_jobs))
        .route("/api/v1/jobs/upload", post(jobs::upload_video))
        .route("/api/v1/jobs/remote", post(jobs::start_remote_job))
        .route("/api/v1/jobs/{job_id}", get(jobs::get_job_status))
        .route("/api/v1/results", get(results::list_results))
        .route("/api/v1/results/{video_id}", get(results::get_result))
        .route("/api/v1/stats", get(results::result_stats))
        .route("/api/v1/detect/image", post(detect::detect_image))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
}
