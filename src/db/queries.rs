use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};

use crate::models::results::{LabelTotals, LogoDetectionRow, ResultStats, StoredVideo, VideoResult};
use crate::services::export::{ExportError, ResultExporter, VideoExport};

/// Label written when a video had no detections, so every export leaves a row.
pub const NO_DETECTIONS_LABEL: &str = "(none)";

/// Insert a video row and return its id.
pub async fn insert_video(
    conn: &mut PgConnection,
    video_type: &str,
    name: &str,
    fps: f64,
    total_video_time_secs: f64,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO videos (type, name, fps, total_video_time_secs)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(video_type)
    .bind(name)
    .bind(fps)
    .bind(total_video_time_secs)
    .fetch_one(conn)
    .await?;

    row.try_get("id")
}

/// Insert one per-label detection row for a video.
pub async fn insert_logo_detection(
    conn: &mut PgConnection,
    video_id: i64,
    detection: &LogoDetectionRow,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO logo_detections
            (video_id, label_name, qty_frames_detected, frame_per_second, frames_appearance_in_percentage)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(video_id)
    .bind(&detection.label_name)
    .bind(detection.qty_frames_detected)
    .bind(detection.frame_per_second)
    .bind(detection.frames_appearance_in_percentage)
    .execute(conn)
    .await?;

    Ok(())
}

/// Get the detection rows stored for a video, ordered by label.
pub async fn get_logo_detections(
    pool: &PgPool,
    video_id: i64,
) -> Result<Vec<LogoDetectionRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT label_name, qty_frames_detected, frame_per_second, frames_appearance_in_percentage
        FROM logo_detections
        WHERE video_id = $1
        ORDER BY label_name ASC
        "#,
    )
    .bind(video_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(LogoDetectionRow {
                label_name: r.try_get("label_name")?,
                qty_frames_detected: r.try_get("qty_frames_detected")?,
                frame_per_second: r.try_get("frame_per_second")?,
                frames_appearance_in_percentage: r.try_get("frames_appearance_in_percentage")?,
            })
        })
        .collect()
}

fn video_from_row(r: &PgRow) -> Result<StoredVideo, sqlx::Error> {
    Ok(StoredVideo {
        id: r.try_get("id")?,
        video_type: r.try_get("type")?,
        name: r.try_get("name")?,
        fps: r.try_get("fps")?,
        total_video_time_secs: r.try_get("total_video_time_secs")?,
        created_at: r.try_get("created_at")?,
    })
}

/// Get one exported video with its detection rows.
pub async fn get_video_result(
    pool: &PgPool,
    video_id: i64,
) -> Result<Option<VideoResult>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, type, name, fps, total_video_time_secs, created_at
        FROM videos
        WHERE id = $1
        "#,
    )
    .bind(video_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let video = video_from_row(&row)?;
    let detections = get_logo_detections(pool, video_id).await?;
    Ok(Some(VideoResult { video, detections }))
}

/// List exported videos, newest first.
pub async fn list_videos(pool: &PgPool, limit: i64) -> Result<Vec<StoredVideo>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, type, name, fps, total_video_time_secs, created_at
        FROM videos
        ORDER BY created_at DESC, id DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(video_from_row).collect()
}

/// Aggregate totals over every exported video.
pub async fn get_result_stats(pool: &PgPool) -> Result<ResultStats, sqlx::Error> {
    let totals = sqlx::query(
        r#"
        SELECT COUNT(*) AS total_videos,
               COALESCE(SUM(total_video_time_secs), 0)::DOUBLE PRECISION AS total_duration_secs
        FROM videos
        "#,
    )
    .fetch_one(pool)
    .await?;

    let label_rows = sqlx::query(
        r#"
        SELECT label_name,
               SUM(qty_frames_detected)::BIGINT AS total_frames_detected,
               COUNT(DISTINCT video_id) AS videos_with_label
        FROM logo_detections
        WHERE label_name <> $1
        GROUP BY label_name
        "#,
    )
    .bind(NO_DETECTIONS_LABEL)
    .fetch_all(pool)
    .await?;

    let mut stats = ResultStats {
        total_videos: totals.try_get("total_videos")?,
        total_duration_secs: totals.try_get("total_duration_secs")?,
        ..ResultStats::default()
    };
    for r in label_rows {
        stats.labels.insert(
            r.try_get("label_name")?,
            LabelTotals {
                total_frames_detected: r.try_get("total_frames_detected")?,
                videos_with_label: r.try_get("videos_with_label")?,
            },
        );
    }
    Ok(stats)
}

/// Rows to write for one finalized video.
pub fn detection_rows(video: &VideoExport) -> Vec<LogoDetectionRow> {
    if video.summary.is_empty() {
        return vec![LogoDetectionRow {
            label_name: NO_DETECTIONS_LABEL.to_string(),
            qty_frames_detected: 0,
            frame_per_second: video.fps,
            frames_appearance_in_percentage: 0.0,
        }];
    }

    video
        .summary
        .iter()
        .map(|(label, summary)| LogoDetectionRow {
            label_name: label.clone(),
            qty_frames_detected: summary.frames as i64,
            frame_per_second: video.fps,
            frames_appearance_in_percentage: summary.percentage_of_video_time,
        })
        .collect()
}

/// Exports finalized results into PostgreSQL, one transaction per video.
pub struct PgExporter {
    pool: PgPool,
}

impl PgExporter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultExporter for PgExporter {
    async fn export(&self, video: &VideoExport) -> Result<i64, ExportError> {
        let mut tx = self.pool.begin().await?;

        let video_id = insert_video(
            &mut tx,
            &video.source_kind.to_string(),
            &video.display_name,
            video.fps,
            video.total_duration_secs,
        )
        .await?;

        for row in detection_rows(video) {
            insert_logo_detection(&mut tx, video_id, &row).await?;
        }

        tx.commit().await?;
        Ok(video_id)
    }
}
