use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;

use crate::services::orchestrator::JobOrchestrator;
use crate::services::store::RedisStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
    /// Present only when result export is configured.
    pub db: Option<PgPool>,
    /// Present only when job snapshots live in Redis.
    pub redis: Option<Arc<RedisStore>>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        orchestrator: JobOrchestrator,
        db: Option<PgPool>,
        redis: Option<Arc<RedisStore>>,
        upload_dir: PathBuf,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            db,
            redis,
            upload_dir,
            max_upload_bytes,
        }
    }
}
