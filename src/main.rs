use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use brand_detector::{
    app_state::AppState,
    config::AppConfig,
    db::{self, queries::PgExporter},
    routes,
    services::{
        acquisition::YtDlpAcquirer,
        detector::HttpDetector,
        export::ResultExporter,
        frames::FfmpegOpener,
        orchestrator::JobOrchestrator,
        store::{DurableStore, JsonFileStore, RedisStore},
        worker::Collaborators,
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing brand-detector server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    // Result export is optional
    let (db_pool, exporter) = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL database");
            let pool = db::init_pool(url)
                .await
                .expect("Failed to connect to database");

            tracing::info!("Running database migrations");
            db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");

            let exporter: Arc<dyn ResultExporter> = Arc::new(PgExporter::new(pool.clone()));
            (Some(pool), Some(exporter))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, result export disabled");
            (None, None)
        }
    };

    // Job snapshots: Redis when configured, JSON files otherwise
    let processing_store: Arc<dyn DurableStore>;
    let remote_store: Arc<dyn DurableStore>;
    let mut redis = None;
    match &config.redis_url {
        Some(url) => {
            tracing::info!("Using Redis job snapshots");
            let processing =
                Arc::new(RedisStore::new(url, "uploads").expect("Failed to initialize Redis store"));
            remote_store =
                Arc::new(RedisStore::new(url, "remote").expect("Failed to initialize Redis store"));
            processing_store = processing.clone();
            redis = Some(processing);
        }
        None => {
            tracing::info!(dir = %config.state_dir.display(), "Using JSON file job snapshots");
            processing_store = Arc::new(JsonFileStore::new(config.state_dir.join("uploads.json")));
            remote_store = Arc::new(JsonFileStore::new(config.state_dir.join("remote.json")));
        }
    }

    tracing::info!(url = %config.detector_url, "Initializing detection engine client");
    let detector = HttpDetector::new(config.detector_url.clone(), config.detector_token.clone())
        .expect("Failed to initialize detection engine client");

    let collaborators = Collaborators {
        opener: Arc::new(FfmpegOpener::new(&config.ffmpeg_path, &config.ffprobe_path)),
        detector: Arc::new(detector),
        acquirer: Arc::new(YtDlpAcquirer::new(
            &config.ytdlp_path,
            &config.download_dir,
            config.acquisition_timeout(),
        )),
        exporter,
    };

    let orchestrator = JobOrchestrator::new(
        processing_store,
        remote_store,
        collaborators,
        config.orchestrator_settings(),
    );
    orchestrator.spawn_watchdog();

    // Create shared application state
    let state = AppState::new(
        orchestrator,
        db_pool,
        redis,
        config.upload_dir.clone(),
        config.max_upload_bytes,
    );

    let app = routes::router(state).route(
        "/metrics",
        get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
    );

    tracing::info!("Starting brand-detector on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
