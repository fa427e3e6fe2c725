use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics — job, frame and store counters in Prometheus text format.
pub async fn prometheus_metrics(
    axum::extract::State(handle): axum::extract::State<Arc<PrometheusHandle>>,
) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "detector_jobs_started_total",
        "Jobs created, labelled by source"
    );
    metrics::describe_counter!(
        "detector_jobs_completed_total",
        "Jobs that reached the completed state"
    );
    metrics::describe_counter!(
        "detector_jobs_failed_total",
        "Jobs that ended in the error state"
    );
    metrics::describe_counter!(
        "detector_watchdog_cancellations_total",
        "Stuck jobs cancelled by the watchdog"
    );
    metrics::describe_counter!(
        "detector_frames_processed_total",
        "Frames run through the detection engine"
    );
    metrics::describe_counter!(
        "detector_export_failures_total",
        "Completed jobs whose result export failed"
    );
    metrics::describe_counter!(
        "detector_store_write_failures_total",
        "Job snapshots that could not be persisted"
    );
    metrics::describe_counter!(
        "detector_images_analyzed_total",
        "Single images run through the detection engine"
    );
    metrics::describe_histogram!(
        "detector_job_duration_seconds",
        "Wall-clock time from worker start to completion"
    );
    metrics::describe_gauge!(
        "detector_active_jobs",
        "Jobs currently holding a worker slot"
    );
}
