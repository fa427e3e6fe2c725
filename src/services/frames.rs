//! Decoded frame sources.
//!
//! The worker only sees the [`FrameSource`] / [`MediaOpener`] traits; the
//! FFmpeg implementation probes the container with `ffprobe` and streams raw
//! RGB frames out of an `ffmpeg` child process.

use async_trait::async_trait;
use image::RgbImage;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

/// One decoded frame. `index` is zero-based within the video.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub image: RgbImage,
}

/// Container-level facts known before decoding starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub fps: f64,
    /// 0 when the container does not say.
    pub frames_total: u64,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait FrameSource: Send {
    fn info(&self) -> VideoInfo;

    /// Next frame, or `None` once the stream is exhausted.
    async fn next_frame(&mut self) -> Result<Option<Frame>, FrameError>;
}

/// Opens a frame source for a local media file.
#[async_trait]
pub trait MediaOpener: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, FrameError>;
}

pub struct FfmpegOpener {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegOpener {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn probe(&self, path: &Path) -> Result<VideoInfo, FrameError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-select_streams",
                "v:0",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| FrameError::Spawn(format!("ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(FrameError::Probe(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        parse_probe_output(&output.stdout)
    }
}

#[async_trait]
impl MediaOpener for FfmpegOpener {
    async fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, FrameError> {
        if !path.exists() {
            return Err(FrameError::NotFound(path.display().to_string()));
        }

        let info = self.probe(path).await?;
        debug!(
            path = %path.display(),
            fps = info.fps,
            frames_total = info.frames_total,
            width = info.width,
            height = info.height,
            "Probed video"
        );

        let mut child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FrameError::Spawn(format!("ffmpeg: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FrameError::Spawn("ffmpeg stdout not captured".to_string()))?;

        Ok(Box::new(FfmpegFrameSource {
            info,
            child,
            reader: RawFrameReader::new(stdout, info.width, info.height),
        }))
    }
}

struct FfmpegFrameSource {
    info: VideoInfo,
    child: Child,
    reader: RawFrameReader<ChildStdout>,
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        match self.reader.read_frame().await? {
            Some(frame) => Ok(Some(frame)),
            None => {
                let status = self.child.wait().await?;
                if status.success() {
                    return Ok(None);
                }
                let mut stderr = String::new();
                if let Some(mut pipe) = self.child.stderr.take() {
                    pipe.read_to_string(&mut stderr).await?;
                }
                Err(FrameError::Decode(format!(
                    "ffmpeg exited with {}: {}",
                    status,
                    stderr.trim()
                )))
            }
        }
    }
}

/// Splits a raw `rgb24` byte stream into frames.
pub struct RawFrameReader<R> {
    reader: R,
    width: u32,
    height: u32,
    next_index: u64,
}

impl<R: AsyncRead + Unpin + Send> RawFrameReader<R> {
    pub fn new(reader: R, width: u32, height: u32) -> Self {
        Self {
            reader,
            width,
            height,
            next_index: 0,
        }
    }

    pub async fn read_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let frame_len = self.width as usize * self.height as usize * 3;
        if frame_len == 0 {
            return Err(FrameError::Probe("video stream has no dimensions".to_string()));
        }

        let mut buf = vec![0u8; frame_len];
        let mut filled = 0;
        while filled < frame_len {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < frame_len {
            return Err(FrameError::Decode(format!(
                "truncated frame {}: {} of {} bytes",
                self.next_index, filled, frame_len
            )));
        }

        let image = RgbImage::from_raw(self.width, self.height, buf)
            .ok_or_else(|| FrameError::Decode("frame buffer size mismatch".to_string()))?;
        let frame = Frame {
            index: self.next_index,
            image,
        };
        self.next_index += 1;
        Ok(Some(frame))
    }
}

// ────────── ffprobe JSON parsing ──────────

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse "30000/1001" or "25" into frames per second.
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let fps = match raw.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse::<f64>().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

fn parse_probe_output(stdout: &[u8]) -> Result<VideoInfo, FrameError> {
    let probe: ProbeOutput =
        serde_json::from_slice(stdout).map_err(|e| FrameError::Probe(e.to_string()))?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| FrameError::Probe("no video stream".to_string()))?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    let duration = stream
        .duration
        .as_deref()
        .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok());

    let frames_total = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .or_else(|| duration.map(|d| (d * fps).round() as u64))
        .unwrap_or(0);

    Ok(VideoInfo {
        fps,
        frames_total,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Media file not found: {0}")]
    NotFound(String),

    #[error("Failed to start decoder: {0}")]
    Spawn(String),

    #[error("Failed to probe media: {0}")]
    Probe(String),

    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Decoder I/O error: {0}")]
    Io(#[from] std::io::Error),
}
