//! Generation request model and prompt normalisation.
//!
//! A [`GenerationRequest`] is built once per inbound prompt and is
//! immutable for the lifetime of a single generation.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Prompt used when the inbound message carries no text besides the mention.
pub const DEFAULT_PROMPT: &str = "hello world";

/// Upper bound on frames in one clip. Keeps a single request from fanning
/// out into thousands of image fetches.
pub const MAX_FRAME_COUNT: u32 = 240;

/// Upper bound on the clip duration.
pub const MAX_TOTAL_DURATION: Duration = Duration::from_secs(120);

/// Which family of backend produces the clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Asynchronous job API: submit, poll, download the finished video.
    JobBased,
    /// Synchronous image API: fetch one still per frame and encode locally.
    FrameBased,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::JobBased => "job",
            BackendKind::FrameBased => "frame",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "job" | "job_based" | "jobs" => Ok(BackendKind::JobBased),
            "frame" | "frame_based" | "frames" => Ok(BackendKind::FrameBased),
            other => Err(CoreError::Validation(format!(
                "Unknown backend kind '{other}'. Must be one of: job, frame"
            ))),
        }
    }
}

/// One prompt-to-clip generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    prompt: String,
    frame_count: u32,
    total_duration: Duration,
    backend_kind: BackendKind,
}

impl GenerationRequest {
    /// Build a request, normalising the prompt and bounding the sizes.
    ///
    /// A zero `frame_count` or zero `total_duration` is accepted here; the
    /// clip assembler rejects it with an assembly error so that the failure
    /// is reported through the normal result channel.
    pub fn new(
        prompt: &str,
        frame_count: u32,
        total_duration: Duration,
        backend_kind: BackendKind,
    ) -> Result<Self, CoreError> {
        if frame_count > MAX_FRAME_COUNT {
            return Err(CoreError::Validation(format!(
                "frame_count must not exceed {MAX_FRAME_COUNT}"
            )));
        }
        if total_duration > MAX_TOTAL_DURATION {
            return Err(CoreError::Validation(format!(
                "total_duration must not exceed {}s",
                MAX_TOTAL_DURATION.as_secs()
            )));
        }
        Ok(Self {
            prompt: normalize_prompt(prompt),
            frame_count,
            total_duration,
            backend_kind,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend_kind
    }
}

/// Chat addressing tokens: user mentions, special mentions, channel links.
static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[@!#][^>]*>").expect("valid regex"));

/// Strip chat addressing tokens (`<@U123>`, `<!here>`, `<#C1|general>`),
/// collapse whitespace, and fall back to [`DEFAULT_PROMPT`] when nothing
/// is left.
pub fn normalize_prompt(raw: &str) -> String {
    let stripped = MENTION_RE.replace_all(raw, " ");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        DEFAULT_PROMPT.to_string()
    } else {
        collapsed
    }
}
