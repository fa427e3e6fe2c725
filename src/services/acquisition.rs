use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

/// A remote video saved to local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredMedia {
    pub path: PathBuf,
    /// Title reported by the source site, if any.
    pub title: Option<String>,
}

/// Fetches a remote video into a local file.
#[async_trait]
pub trait Acquirer: Send + Sync {
    async fn acquire(&self, url: &str) -> Result<AcquiredMedia, AcquisitionError>;
}

/// Downloads through the `yt-dlp` command-line tool.
pub struct YtDlpAcquirer {
    binary: PathBuf,
    download_dir: PathBuf,
    timeout: Duration,
}

impl YtDlpAcquirer {
    pub fn new(binary: impl Into<PathBuf>, download_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            download_dir: download_dir.into(),
            timeout,
        }
    }

    fn command(&self, url: &str) -> Command {
        let template = self
            .download_dir
            .join(format!("{}.%(ext)s", Uuid::new_v4()));

        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "--no-playlist",
            "--no-simulate",
            "--no-progress",
            "-f",
            "mp4/best",
            "--print",
            "title",
            "--print",
            "after_move:filepath",
            "-o",
        ])
        .arg(template)
        .arg(url)
        .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Acquirer for YtDlpAcquirer {
    async fn acquire(&self, url: &str) -> Result<AcquiredMedia, AcquisitionError> {
        tokio::fs::create_dir_all(&self.download_dir).await?;
        info!(url = %url, "Downloading remote video");

        let output = tokio::time::timeout(self.timeout, self.command(url).output())
            .await
            .map_err(|_| AcquisitionError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| AcquisitionError::Spawn(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AcquisitionError::Failed(last_error_line(&stderr)));
        }

        let media = parse_download_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!(path = %media.path.display(), title = ?media.title, "Remote video saved");
        Ok(media)
    }
}

/// `yt-dlp --print title --print after_move:filepath` prints the title
/// first and the final file path last.
fn parse_download_output(stdout: &str) -> Result<AcquiredMedia, AcquisitionError> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let path = lines
        .last()
        .map(PathBuf::from)
        .ok_or(AcquisitionError::NoOutputFile)?;
    if !Path::new(&path).exists() {
        return Err(AcquisitionError::NoOutputFile);
    }

    let title = if lines.len() >= 2 {
        Some(lines[0].to_string())
    } else {
        None
    };
    Ok(AcquiredMedia { path, title })
}

fn last_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("downloader exited with an error")
        .to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("Failed to start downloader: {0}")]
    Spawn(String),

    #[error("Download timed out after {0} seconds")]
    Timeout(u64),

    #[error("Download failed: {0}")]
    Failed(String),

    #[error("Downloader did not produce a file")]
    NoOutputFile,

    #[error("Download directory error: {0}")]
    Io(#[from] std::io::Error),
}
