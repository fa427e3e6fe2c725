use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{debug, warn};

use crate::app_state::AppState;
use crate::models::api::ImageDetectionResponse;
use crate::routes::jobs::{api_error, ApiError};

/// POST /api/v1/detect/image — Run the detection engine on one uploaded image.
pub async fn detect_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImageDetectionResponse>, ApiError> {
    let mut data = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
            data = Some(bytes);
        }
    }

    let data = data.ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "missing multipart field 'file'"))?;
    if data.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "uploaded image is empty"));
    }
    if data.len() > state.max_upload_bytes {
        return Err(api_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "image is {} bytes, limit is {}",
                data.len(),
                state.max_upload_bytes
            ),
        ));
    }

    let image = image::load_from_memory(&data)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("invalid image: {}", e)))?
        .to_rgb8();

    let detections = state
        .orchestrator
        .detect_image(image)
        .await
        .map_err(|e| {
            warn!(error = %e, "Image detection failed");
            api_error(StatusCode::BAD_GATEWAY, format!("detection engine error: {}", e))
        })?;
    debug!(detections = detections.len(), "Image analyzed");

    Ok(Json(ImageDetectionResponse {
        logo_detected: !detections.is_empty(),
        detections,
    }))
}
