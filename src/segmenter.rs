use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::container::ContainerFormat;

/// Chunk files are named with a zero-padded index so that lexical order is
/// segment order.
const CHUNK_PREFIX: &str = "chunk_";

/// Segmentation process errors. Timeouts are distinguished from process
/// failures so callers can decide retry policy; the split pipeline treats
/// both as fatal for the request.
#[derive(Debug)]
pub enum SegmenterError {
    /// The process exceeded the wall-clock bound and was killed
    TimedOut { after: Duration },
    /// The process could not be spawned or exited non-zero
    Failed(String),
    /// Output chunks could not be listed or read
    Io(std::io::Error),
}

impl fmt::Display for SegmenterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmenterError::TimedOut { after } => {
                write!(f, "Segmentation timed out after {}s", after.as_secs())
            }
            SegmenterError::Failed(msg) => write!(f, "Segmentation failed: {}", msg),
            SegmenterError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl StdError for SegmenterError {}

impl From<std::io::Error> for SegmenterError {
    fn from(err: std::io::Error) -> Self {
        SegmenterError::Io(err)
    }
}

/// Splits one audio file into fixed-length chunks without re-encoding.
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Produce chunks of `segment_seconds` from `input` inside `out_dir`,
    /// returning the chunk paths in segment-index order.
    async fn segment(
        &self,
        input: &Path,
        out_dir: &Path,
        segment_seconds: u64,
        format: ContainerFormat,
    ) -> Result<Vec<PathBuf>, SegmenterError>;
}

/// ffmpeg-backed segmenter: stream-copies the first audio stream into the
/// segment muxer with per-chunk timestamps reset to zero.
pub struct FfmpegSegmenter {
    binary: String,
    timeout: Duration,
}

impl FfmpegSegmenter {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn build_args(
        input: &Path,
        out_dir: &Path,
        segment_seconds: u64,
        format: ContainerFormat,
    ) -> Vec<String> {
        let pattern = out_dir.join(format!("{}%03d.{}", CHUNK_PREFIX, format.extension()));
        vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            // Only the audio stream; recorders embed cover art and data
            // streams the chunks must not carry.
            "-map".to_string(),
            "0:a:0".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-f".to_string(),
            "segment".to_string(),
            "-segment_time".to_string(),
            segment_seconds.to_string(),
            "-reset_timestamps".to_string(),
            "1".to_string(),
            "-segment_format".to_string(),
            format.muxer().to_string(),
            pattern.to_string_lossy().to_string(),
        ]
    }

    fn list_chunks(out_dir: &Path) -> Result<Vec<PathBuf>, SegmenterError> {
        let mut chunks: Vec<PathBuf> = std::fs::read_dir(out_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with(CHUNK_PREFIX))
                    .unwrap_or(false)
            })
            .collect();
        // Zero-padded names: lexical order is index order
        chunks.sort();
        Ok(chunks)
    }
}

#[async_trait]
impl Segmenter for FfmpegSegmenter {
    async fn segment(
        &self,
        input: &Path,
        out_dir: &Path,
        segment_seconds: u64,
        format: ContainerFormat,
    ) -> Result<Vec<PathBuf>, SegmenterError> {
        let args = Self::build_args(input, out_dir, segment_seconds, format);
        info!("Running {} {}", self.binary, args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SegmenterError::Failed(format!("Failed to start {}: {}", self.binary, e)))?;

        let mut stderr_pipe = child.stderr.take();
        let wait_for_exit = async {
            // Drain stderr while waiting so the child can never block on a
            // full pipe.
            let mut stderr_buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut stderr_buf).await;
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stderr_buf))
        };

        let waited = tokio::time::timeout(self.timeout, wait_for_exit).await;
        let (status, stderr_buf) = match waited {
            Ok(result) => result?,
            Err(_) => {
                if let Err(err) = child.kill().await {
                    warn!("Failed to kill timed-out segmenter process: {}", err);
                }
                return Err(SegmenterError::TimedOut {
                    after: self.timeout,
                });
            }
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_buf);
            let tail: String = stderr
                .lines()
                .rev()
                .take(10)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(SegmenterError::Failed(format!(
                "{} exited with {}: {}",
                self.binary, status, tail
            )));
        }

        Self::list_chunks(out_dir)
    }
}
