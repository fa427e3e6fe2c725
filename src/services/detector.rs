use async_trait::async_trait;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::detection::Detection;
use crate::services::frames::Frame;

/// Finds brand logos in a single frame.
///
/// Implementations return every candidate they see; confidence filtering is
/// the caller's job.
#[async_trait]
pub trait DetectionEngine: Send + Sync {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError>;
}

/// Client for an HTTP inference service that accepts a base64 JPEG and
/// answers with a list of labelled boxes.
pub struct HttpDetector {
    http: Client,
    endpoint: String,
    api_token: Option<String>,
}

#[derive(Serialize)]
struct DetectRequest {
    image: String,
}

#[derive(Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<Detection>,
}

impl HttpDetector {
    pub fn new(endpoint: String, api_token: Option<String>) -> Result<Self, DetectionError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            endpoint,
            api_token,
        })
    }
}

/// Encode a frame as JPEG for transport.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>, DetectionError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 90).encode_image(&frame.image)?;
    Ok(bytes)
}

#[async_trait]
impl DetectionEngine for HttpDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        let jpeg = encode_jpeg(frame)?;
        let body = DetectRequest {
            image: base64::engine::general_purpose::STANDARD.encode(jpeg),
        };

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DetectionError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: DetectResponse = response.json().await?;
        Ok(parsed.detections)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Detection service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
}
