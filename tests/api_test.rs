//! HTTP API tests against an in-process server backed by fake collaborators.

mod helpers;

use reqwest::multipart;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use brand_detector::app_state::AppState;
use brand_detector::models::api::{JobStatusResponse, StartJobResponse};
use brand_detector::models::job::JobState;
use brand_detector::routes;
use brand_detector::services::store::JsonFileStore;

use helpers::*;

struct TestServer {
    base_url: String,
    _upload_dir: tempfile::TempDir,
}

fn default_harness() -> Harness {
    let detector = ScriptedDetector::new().on_frames(0..3, vec![detection("acme", 0.95)]);
    Harness::new(ScriptedOpener::new(12, 6.0), detector)
}

async fn spawn_server(max_upload_bytes: usize) -> TestServer {
    spawn_server_with(default_harness(), max_upload_bytes).await
}

async fn spawn_server_with(harness: Harness, max_upload_bytes: usize) -> TestServer {
    let upload_dir = tempfile::tempdir().unwrap();
    let orchestrator = harness.build();

    let state = AppState::new(
        orchestrator,
        None,
        None,
        upload_dir.path().to_path_buf(),
        max_upload_bytes,
    );
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        _upload_dir: upload_dir,
    }
}

async fn upload(
    client: &reqwest::Client,
    base_url: &str,
    filename: &str,
    bytes: Vec<u8>,
) -> reqwest::Response {
    let part = multipart::Part::bytes(bytes).file_name(filename.to_string());
    let form = multipart::Form::new().part("file", part);
    client
        .post(format!("{}/api/v1/jobs/upload", base_url))
        .multipart(form)
        .send()
        .await
        .expect("Upload request failed")
}

async fn poll_until_terminal(client: &reqwest::Client, base_url: &str, job_id: Uuid) -> JobStatusResponse {
    for _ in 0..300 {
        let status: JobStatusResponse = client
            .get(format!("{}/api/v1/jobs/{}", base_url, job_id))
            .send()
            .await
            .expect("Status request failed")
            .json()
            .await
            .expect("Invalid status body");
        if status.record.state.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish", job_id);
}

#[tokio::test]
async fn test_health_without_optional_dependencies() {
    let server = spawn_server(1024).await;
    let response = reqwest::get(format!("{}/health", server.base_url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["database"]["status"], "disabled");
    assert_eq!(body["checks"]["redis"]["status"], "disabled");
}

#[tokio::test]
async fn test_upload_runs_job_to_completion() {
    let server = spawn_server(1024).await;
    let client = reqwest::Client::new();

    let response = upload(&client, &server.base_url, "my ad.mp4", vec![0u8; 64]).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let started: StartJobResponse = response.json().await.unwrap();
    assert_eq!(started.status, JobState::Initializing);

    let status = poll_until_terminal(&client, &server.base_url, started.job_id).await;
    assert_eq!(status.job_id, started.job_id);
    assert_eq!(status.record.state, JobState::Completed);
    assert_eq!(status.record.display_name, "my ad.mp4");
    assert_eq!(status.record.detections["acme"].frames, 3);
    assert!(status.record.source_ref.ends_with("_my_ad.mp4"));
}

#[tokio::test]
async fn test_upload_rejects_unsupported_and_oversized_files() {
    let server = spawn_server(128).await;
    let client = reqwest::Client::new();

    let response = upload(&client, &server.base_url, "notes.txt", vec![1u8; 16]).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("txt"));

    let response = upload(&client, &server.base_url, "big.mp4", vec![1u8; 256]).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let form = multipart::Form::new().text("other", "value");
    let response = client
        .post(format!("{}/api/v1/jobs/upload", server.base_url))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_remote_job_validation() {
    let server = spawn_server(1024).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/v1/jobs/remote", server.base_url))
        .json(&serde_json::json!({ "url": "not a url" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = client
        .post(format!("{}/api/v1/jobs/remote", server.base_url))
        .json(&serde_json::json!({ "url": "ftp://example.com/video.mp4" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Accepted, then fails in acquisition with the default failing acquirer
    let response = client
        .post(format!("{}/api/v1/jobs/remote", server.base_url))
        .json(&serde_json::json!({ "url": "https://example.com/watch?v=1", "name": "promo" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let started: StartJobResponse = response.json().await.unwrap();

    let status = poll_until_terminal(&client, &server.base_url, started.job_id).await;
    assert_eq!(status.record.state, JobState::Error);
    assert_eq!(status.record.display_name, "promo");
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let server = spawn_server(1024).await;
    let response = reqwest::get(format!("{}/api/v1/jobs/{}", server.base_url, Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_list_active_jobs_starts_empty() {
    let server = spawn_server(1024).await;
    let jobs: Vec<Value> = reqwest::get(format!("{}/api/v1/jobs", server.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn test_unreadable_job_store_is_503_not_404() {
    let store_dir = tempfile::tempdir().unwrap();
    let snapshot = store_dir.path().join("uploads.json");
    std::fs::create_dir(&snapshot).unwrap();

    let mut harness = default_harness();
    harness.processing_store = Arc::new(JsonFileStore::new(&snapshot));
    let server = spawn_server_with(harness, 1024).await;

    let response = reqwest::get(format!("{}/api/v1/jobs/{}", server.base_url, Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // A job whose snapshot cannot be written makes the service report degraded.
    let client = reqwest::Client::new();
    let response = upload(&client, &server.base_url, "clip.mp4", vec![0u8; 64]).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = reqwest::get(format!("{}/health", server.base_url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["checks"]["job_store"]["status"], "error");
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4))
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

async fn post_image(client: &reqwest::Client, base_url: &str, bytes: Vec<u8>) -> reqwest::Response {
    let part = multipart::Part::bytes(bytes).file_name("logo.png".to_string());
    client
        .post(format!("{}/api/v1/detect/image", base_url))
        .multipart(multipart::Form::new().part("file", part))
        .send()
        .await
        .expect("Image request failed")
}

#[tokio::test]
async fn test_detect_image_reports_confident_labels() {
    let server = spawn_server(1024 * 1024).await;
    let client = reqwest::Client::new();

    let response = post_image(&client, &server.base_url, png_bytes()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["logo_detected"], true);
    assert_eq!(body["detections"][0]["label"], "acme");
}

#[tokio::test]
async fn test_detect_image_filters_low_confidence() {
    let detector = ScriptedDetector::new().on_frames([0], vec![detection("blur", 0.2)]);
    let harness = Harness::new(ScriptedOpener::new(1, 1.0), detector);
    let server = spawn_server_with(harness, 1024 * 1024).await;

    let response = post_image(&reqwest::Client::new(), &server.base_url, png_bytes()).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["logo_detected"], false);
    assert_eq!(body["detections"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_detect_image_rejects_undecodable_upload() {
    let server = spawn_server(1024 * 1024).await;
    let response = post_image(&reqwest::Client::new(), &server.base_url, b"not an image".to_vec()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("invalid image"));
}

#[tokio::test]
async fn test_results_need_a_database() {
    let server = spawn_server(1024).await;

    for path in ["/api/v1/results", "/api/v1/results/1", "/api/v1/stats"] {
        let response = reqwest::get(format!("{}{}", server.base_url, path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{}", path);
    }

    let response = reqwest::get(format!("{}/api/v1/results?limit=0", server.base_url))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
