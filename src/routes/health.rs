use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_jobs: usize,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: ComponentHealth,
    pub redis: ComponentHealth,
    pub job_store: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn disabled() -> Self {
        Self {
            status: "disabled".to_string(),
            latency_ms: None,
            error: None,
        }
    }

    fn from_result<E: std::fmt::Display>(result: Result<(), E>, start: std::time::Instant) -> Self {
        match result {
            Ok(()) => Self {
                status: "ok".to_string(),
                latency_ms: Some(start.elapsed().as_millis() as u64),
                error: None,
            },
            Err(e) => Self {
                status: "error".to_string(),
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn is_failing(&self) -> bool {
        self.status == "error"
    }
}

/// GET /health — liveness plus status of configured dependencies.
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let db_check = match &state.db {
        Some(pool) => {
            let start = std::time::Instant::now();
            let result = sqlx::query("SELECT 1").execute(pool).await.map(|_| ());
            ComponentHealth::from_result(result, start)
        }
        None => ComponentHealth::disabled(),
    };

    let redis_check = match &state.redis {
        Some(redis) => {
            let start = std::time::Instant::now();
            ComponentHealth::from_result(redis.health_check().await, start)
        }
        None => ComponentHealth::disabled(),
    };

    // Snapshot writes that keep failing mean job state would not survive a restart.
    let store_check = ComponentHealth::from_result(
        state.orchestrator.store_health(),
        std::time::Instant::now(),
    );

    let all_healthy =
        !db_check.is_failing() && !redis_check.is_failing() && !store_check.is_failing();
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_jobs: state.orchestrator.active_jobs().len(),
        checks: HealthChecks {
            database: db_check,
            redis: redis_check,
            job_store: store_check,
        },
    };

    (status_code, Json(response))
}
