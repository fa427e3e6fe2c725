use brand_detector::{
    config::AppConfig,
    db::{self, queries},
    models::detection::{DetectionSummary, LabelSummary},
    models::job::{JobRecord, JobState, SourceKind},
    services::{
        export::{ResultExporter, VideoExport},
        frames::{FfmpegOpener, MediaOpener},
        store::{DurableStore, RedisStore},
    },
};
use std::path::Path;
use uuid::Uuid;

/// Integration test: result export into PostgreSQL
///
/// Note: This requires a running PostgreSQL instance configured via
/// DATABASE_URL.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_postgres_export() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let database_url = config.database_url.expect("DATABASE_URL must be set");

    let db_pool = db::init_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    let exporter = queries::PgExporter::new(db_pool.clone());

    let mut summary = DetectionSummary::new();
    summary.insert(
        "acme".to_string(),
        LabelSummary {
            detections: 12,
            frames: 11,
            first_frame: 10,
            last_frame: 20,
            first_seen_secs: 0.4,
            last_seen_secs: 0.8,
            seconds_visible: 0.44,
            percentage_of_frames: 11.0,
            percentage_of_video_time: 11.0,
        },
    );
    let video = VideoExport {
        source_kind: SourceKind::LocalUpload,
        display_name: format!("integration-{}.mp4", Uuid::new_v4()),
        fps: 25.0,
        total_duration_secs: 4.0,
        frames_total: 100,
        summary,
    };

    let video_id = exporter.export(&video).await.expect("Export failed");
    let rows = queries::get_logo_detections(&db_pool, video_id)
        .await
        .expect("Failed to read detections");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].label_name, "acme");
    assert_eq!(rows[0].qty_frames_detected, 11);

    // A video without detections still leaves a placeholder row
    let empty = VideoExport {
        summary: DetectionSummary::new(),
        ..video
    };
    let empty_id = exporter.export(&empty).await.expect("Export failed");
    let rows = queries::get_logo_detections(&db_pool, empty_id)
        .await
        .expect("Failed to read detections");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].label_name, queries::NO_DETECTIONS_LABEL);

    let result = queries::get_video_result(&db_pool, video_id)
        .await
        .expect("Failed to read result")
        .expect("Result missing");
    assert_eq!(result.video.id, video_id);
    assert_eq!(result.video.video_type, "local_upload");
    assert_eq!(result.detections[0].label_name, "acme");
    assert!(queries::get_video_result(&db_pool, -1)
        .await
        .expect("Failed to read result")
        .is_none());

    let listed = queries::list_videos(&db_pool, 10)
        .await
        .expect("Failed to list videos");
    assert!(listed.iter().any(|v| v.id == empty_id));

    let stats = queries::get_result_stats(&db_pool)
        .await
        .expect("Failed to read stats");
    assert!(stats.total_videos >= 2);
    assert!(stats.labels["acme"].videos_with_label >= 1);
    assert!(!stats.labels.contains_key(queries::NO_DETECTIONS_LABEL));

    println!("✅ PostgreSQL export test passed!");
}

/// Integration test: Redis-backed job snapshots
///
/// Note: This requires a running Redis instance configured via REDIS_URL.
#[tokio::test]
#[ignore]
async fn test_redis_store_roundtrip() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let redis_url = config.redis_url.expect("REDIS_URL must be set");

    let namespace = format!("test-{}", Uuid::new_v4());
    let store = RedisStore::new(&redis_url, &namespace).expect("Failed to create Redis store");
    store.health_check().await.expect("Redis not reachable");

    let mut record = JobRecord::new(SourceKind::LocalUpload, "clip.mp4", "/tmp/clip.mp4");
    record.begin_processing(100, 25.0).unwrap();
    record.revision = 3;
    store.put(&record).await.expect("Put failed");

    // An older snapshot never replaces a newer one
    let mut stale = record.clone();
    stale.revision = 1;
    stale.display_name = "stale".to_string();
    store.put(&stale).await.expect("Put failed");

    let loaded = store
        .get(record.id)
        .await
        .expect("Get failed")
        .expect("Record missing");
    assert_eq!(loaded.display_name, "clip.mp4");
    assert_eq!(loaded.state, JobState::Processing);

    let all = store.load_all().await.expect("Load failed");
    assert!(all.contains_key(&record.id));

    println!("✅ Redis store test passed!");
}

/// Integration test: decode a real video with ffmpeg
///
/// Note: Requires ffmpeg/ffprobe on PATH and TEST_VIDEO pointing at a file.
#[tokio::test]
#[ignore]
async fn test_ffmpeg_frame_source() {
    let video = std::env::var("TEST_VIDEO").expect("TEST_VIDEO must be set");
    let opener = FfmpegOpener::new("ffmpeg", "ffprobe");

    let mut source = opener
        .open(Path::new(&video))
        .await
        .expect("Failed to open video");
    let info = source.info();
    assert!(info.fps > 0.0);
    assert!(info.width > 0 && info.height > 0);

    let mut frames = 0u64;
    while let Some(frame) = source.next_frame().await.expect("Decode failed") {
        assert_eq!(frame.index, frames);
        assert_eq!(frame.image.width(), info.width);
        frames += 1;
    }
    assert!(frames > 0);

    println!("✅ Decoded {} frames at {:.2} fps", frames, info.fps);
}
