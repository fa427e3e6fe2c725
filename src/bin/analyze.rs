//! Analyze a single video in-process and print the final job record.
//!
//! Usage:
//!   analyze path/to/video.mp4
//!   analyze --url https://www.youtube.com/watch?v=...
//!
//! Uses the same environment configuration as the server. Job records are
//! kept in memory; results are exported only when DATABASE_URL is set.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use brand_detector::{
    config::AppConfig,
    db::{self, queries::PgExporter},
    models::job::JobState,
    services::{
        acquisition::YtDlpAcquirer,
        detector::HttpDetector,
        export::ResultExporter,
        frames::FfmpegOpener,
        orchestrator::JobOrchestrator,
        store::MemoryStore,
        worker::Collaborators,
    },
};

const POLL_INTERVAL_MS: u64 = 500;

#[derive(Parser)]
#[command(name = "analyze", version, about = "Detect brand logos in one video")]
struct Args {
    /// Local video file
    #[arg(required_unless_present = "url", conflicts_with = "url")]
    path: Option<PathBuf>,

    /// Remote video URL to download and analyze
    #[arg(long)]
    url: Option<String>,

    /// Display name for the job
    #[arg(long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env().expect("Failed to load configuration");

    let exporter: Option<Arc<dyn ResultExporter>> = match &config.database_url {
        Some(url) => {
            let pool = db::init_pool(url)
                .await
                .expect("Failed to connect to database");
            db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            Some(Arc::new(PgExporter::new(pool)))
        }
        None => None,
    };

    let collaborators = Collaborators {
        opener: Arc::new(FfmpegOpener::new(&config.ffmpeg_path, &config.ffprobe_path)),
        detector: Arc::new(
            HttpDetector::new(config.detector_url.clone(), config.detector_token.clone())
                .expect("Failed to initialize detection engine client"),
        ),
        acquirer: Arc::new(YtDlpAcquirer::new(
            &config.ytdlp_path,
            &config.download_dir,
            config.acquisition_timeout(),
        )),
        exporter,
    };

    let orchestrator = JobOrchestrator::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        collaborators,
        config.orchestrator_settings(),
    );
    let _watchdog = orchestrator.spawn_watchdog();

    let started = match (&args.url, args.path) {
        (Some(url), _) => orchestrator.start_remote(url, args.name).await,
        (None, Some(path)) => {
            let name = args.name.unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            });
            orchestrator.start_local(path, name).await
        }
        (None, None) => unreachable!("clap requires a path or --url"),
    };

    let job_id = match started {
        Ok(record) => record.id,
        Err(e) => {
            eprintln!("Failed to start job: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(job_id = %job_id, "Job started");

    let record = loop {
        tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        match orchestrator.status(job_id).await {
            Ok(record) if record.state.is_terminal() => break record,
            Ok(record) => {
                tracing::info!(
                    job_id = %job_id,
                    state = %record.state,
                    progress = record.progress_percent,
                    "Waiting for job"
                );
            }
            Err(e) => {
                eprintln!("Lost track of job {}: {}", job_id, e);
                return ExitCode::FAILURE;
            }
        }
    };

    orchestrator.wait_idle().await;
    // Pick up warnings added after the terminal state, e.g. a failed export.
    let record = orchestrator.status(job_id).await.unwrap_or(record);

    match serde_json::to_string_pretty(&record) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize result: {}", e),
    }

    if record.state == JobState::Error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
