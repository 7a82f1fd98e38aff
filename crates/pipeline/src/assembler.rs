//! Clip assembly: ordered stills in, one H.264 MP4 out.
//!
//! Each still is held for its share of the clip (see
//! [`ClipTiming`](reelgen_core::clip::ClipTiming)), the stills are joined
//! with the ffmpeg concat demuxer, and a single fade-in is applied at the
//! very start of the output. The encoder frame count is capped at the
//! planned total so the output never runs long.

use std::fmt::Write as _;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use image::ImageFormat;
use reelgen_core::clip::{ClipTiming, DEFAULT_FPS};
use reelgen_core::error::CoreError;
use reelgen_core::frame::Frame;

use crate::ffmpeg::{self, FfmpegError};

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    /// The frames or duration cannot form a clip (no frames, zero length).
    #[error("Invalid clip input: {0}")]
    InvalidInput(#[from] CoreError),

    #[error("Failed to encode still {ordinal}: {source}")]
    Still {
        ordinal: u32,
        #[source]
        source: image::ImageError,
    },

    #[error("Encoder failed: {0}")]
    Encoder(#[from] FfmpegError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns an ordered frame sequence into encoded video bytes.
#[async_trait]
pub trait ClipEncoder: Send + Sync {
    async fn assemble(&self, frames: &[Frame], total: Duration) -> Result<Vec<u8>, AssemblyError>;
}

/// [`ClipEncoder`] backed by the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegAssembler {
    ffmpeg: PathBuf,
    fps: u32,
}

impl FfmpegAssembler {
    pub fn new(fps: u32) -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            fps,
        }
    }

    /// Use a specific `ffmpeg` binary instead of the one on `PATH`.
    pub fn with_binary(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }
}

impl Default for FfmpegAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_FPS)
    }
}

#[async_trait]
impl ClipEncoder for FfmpegAssembler {
    async fn assemble(&self, frames: &[Frame], total: Duration) -> Result<Vec<u8>, AssemblyError> {
        let timing = ClipTiming::plan(frames.len(), total, self.fps)?;

        let scratch = tempfile::tempdir()?;
        let mut stills = Vec::with_capacity(frames.len());
        for (index, frame) in frames.iter().enumerate() {
            let path = scratch.path().join(format!("frame_{index:04}.png"));
            tokio::fs::write(&path, encode_png(frame)?).await?;
            stills.push(path);
        }

        let list_path = scratch.path().join("frames.ffconcat");
        tokio::fs::write(&list_path, concat_list(&stills, &timing)).await?;

        let output = scratch.path().join("clip.mp4");
        let args = encode_args(&list_path, &output, &timing);
        tracing::debug!(
            frames = frames.len(),
            total_ms = total.as_millis() as u64,
            encoder_frames = timing.total_frames(),
            fade_ms = timing.fade_in.as_millis() as u64,
            "Encoding clip",
        );
        ffmpeg::run_ffmpeg(&self.ffmpeg, &args).await?;

        Ok(tokio::fs::read(&output).await?)
    }
}

fn encode_png(frame: &Frame) -> Result<Vec<u8>, AssemblyError> {
    let mut buf = Cursor::new(Vec::new());
    frame
        .image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|source| AssemblyError::Still {
            ordinal: frame.ordinal,
            source,
        })?;
    Ok(buf.into_inner())
}

/// ffconcat script holding each still for its quantised span.
///
/// The concat demuxer ignores the duration of the last entry unless the
/// file is listed once more, so the last still is repeated.
pub fn concat_list(stills: &[PathBuf], timing: &ClipTiming) -> String {
    let mut list = String::from("ffconcat version 1.0\n");
    for (index, path) in stills.iter().enumerate() {
        let _ = writeln!(list, "file '{}'", escape_path(path));
        let _ = writeln!(list, "duration {:.6}", timing.span_duration(index).as_secs_f64());
    }
    if let Some(last) = stills.last() {
        let _ = writeln!(list, "file '{}'", escape_path(last));
    }
    list
}

fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}

/// Video filter: constant frame rate, lead-in fade, yuv420p.
pub fn filter_graph(timing: &ClipTiming) -> String {
    let mut graph = format!("fps={}", timing.fps);
    if !timing.fade_in.is_zero() {
        let _ = write!(
            graph,
            ",fade=t=in:st=0:d={:.3}",
            timing.fade_in.as_secs_f64()
        );
    }
    graph.push_str(",format=yuv420p");
    graph
}

pub fn encode_args(list: &Path, output: &Path, timing: &ClipTiming) -> Vec<String> {
    vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list.to_string_lossy().to_string(),
        "-vf".into(),
        filter_graph(timing),
        "-frames:v".into(),
        timing.total_frames().to_string(),
        "-r".into(),
        timing.fps.to_string(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().to_string(),
    ]
}
