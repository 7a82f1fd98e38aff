//! Scripted collaborators for fetcher and orchestrator tests.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use reelgen_backends::candidate::BackendCandidate;
use reelgen_backends::frame_api::{FrameApiError, FrameSource};
use reelgen_backends::job_api::{JobApiError, JobBackend, StatusReply, SubmitReply};
use reelgen_core::frame::Frame;
use tokio::time::Instant;

use crate::assembler::{AssemblyError, ClipEncoder};

/// PNG bytes of a solid `width x height` image.
pub(crate) fn png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    RgbImage::from_pixel(width, height, Rgb(color))
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn next<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Replays image responses in call order; the last entry is sticky.
/// `Err(code)` is returned as an HTTP status failure.
pub(crate) struct ScriptedFrames {
    script: Mutex<VecDeque<Result<Vec<u8>, u16>>>,
    calls: Mutex<Vec<(String, Instant)>>,
    stall: bool,
}

impl ScriptedFrames {
    pub fn new(script: Vec<Result<Vec<u8>, u16>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            stall: false,
        }
    }

    /// A source that accepts every request and never answers.
    pub fn stalled() -> Self {
        Self {
            stall: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }
}

#[async_trait]
impl FrameSource for ScriptedFrames {
    async fn fetch(&self, prompt: &str, _seed: u64) -> Result<Vec<u8>, FrameApiError> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), Instant::now()));
        if self.stall {
            return std::future::pending().await;
        }
        let step = next(&mut *self.script.lock().unwrap());
        match step {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(status)) => Err(FrameApiError::Status {
                status,
                body: "scripted".into(),
            }),
            None => Err(FrameApiError::Empty),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Records what it was asked to encode and returns fixed bytes.
#[derive(Default)]
pub(crate) struct RecordingEncoder {
    pub seen: Mutex<Vec<(Vec<Frame>, Duration)>>,
    pub fail: bool,
}

impl RecordingEncoder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ClipEncoder for RecordingEncoder {
    async fn assemble(&self, frames: &[Frame], total: Duration) -> Result<Vec<u8>, AssemblyError> {
        self.seen.lock().unwrap().push((frames.to_vec(), total));
        if self.fail {
            return Err(AssemblyError::Io(std::io::Error::other("encoder crashed")));
        }
        reelgen_core::clip::ClipTiming::plan(frames.len(), total, 24)?;
        Ok(b"encoded-clip".to_vec())
    }
}

// ---------------------------------------------------------------------------
// Job backend
// ---------------------------------------------------------------------------

/// Minimal job backend: fixed submit reply per candidate, status script
/// shared across jobs, fixed download bytes.
#[derive(Default)]
pub(crate) struct ScriptedJobs {
    submits: HashMap<String, (u16, &'static str)>,
    statuses: Mutex<VecDeque<(&'static str, Option<&'static str>, Option<&'static str>)>>,
    pub submitted: Mutex<Vec<String>>,
    pub polled: Mutex<u32>,
}

impl ScriptedJobs {
    pub fn on_submit(mut self, candidate: &str, status: u16, body: &'static str) -> Self {
        self.submits.insert(candidate.to_string(), (status, body));
        self
    }

    /// `(status, output_url, error)` per poll.
    pub fn with_statuses(
        self,
        script: Vec<(&'static str, Option<&'static str>, Option<&'static str>)>,
    ) -> Self {
        *self.statuses.lock().unwrap() = script.into();
        self
    }
}

#[async_trait]
impl JobBackend for ScriptedJobs {
    async fn submit(
        &self,
        candidate: &BackendCandidate,
        _body: &serde_json::Value,
    ) -> Result<SubmitReply, JobApiError> {
        self.submitted.lock().unwrap().push(candidate.name.clone());
        let (status, body) = self
            .submits
            .get(&candidate.name)
            .copied()
            .unwrap_or((404, "unscripted"));
        Ok(SubmitReply {
            status,
            body: body.to_string(),
        })
    }

    async fn status(
        &self,
        _candidate: &BackendCandidate,
        _job_id: &str,
    ) -> Result<StatusReply, JobApiError> {
        *self.polled.lock().unwrap() += 1;
        let (status, output, error) =
            next(&mut *self.statuses.lock().unwrap()).unwrap_or(("pending", None, None));
        Ok(StatusReply {
            status: status.to_string(),
            output_url: output.map(str::to_string),
            detail: error.map(str::to_string),
        })
    }

    async fn download(&self, _url: &str) -> Result<Vec<u8>, JobApiError> {
        Ok(b"backend-video".to_vec())
    }
}

pub(crate) fn candidate(name: &str) -> BackendCandidate {
    BackendCandidate {
        name: name.to_string(),
        base_url: format!("https://backend.test/{name}"),
        headers: Default::default(),
        payload_template: serde_json::json!({"prompt": "{{prompt}}"}),
    }
}
