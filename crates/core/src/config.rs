//! Tunables for a generation: frame geometry, retry budget, timing.
//!
//! Loaded from the environment by the API binary and passed by value into
//! the pipeline, so tests can construct tight configurations directly.

use std::time::Duration;

use crate::backoff::{BackoffPolicy, DEFAULT_BACKOFF_BASE};
use crate::clip::{encoder_frames, DEFAULT_FPS};
use crate::error::CoreError;
use crate::generation::{BackendKind, MAX_FRAME_COUNT, MAX_TOTAL_DURATION};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_FRAME_WIDTH: u32 = 768;
pub const DEFAULT_FRAME_HEIGHT: u32 = 432;

/// Neutral grey used when no frame could be fetched.
pub const DEFAULT_PLACEHOLDER_COLOR: [u8; 3] = [32, 32, 32];

/// Attempts per frame (and per transient job-API call) before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Longest wait for any single backend call (frame fetch, submit, status,
/// download). An overrun counts as a failed attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(90);

/// Interval between job status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// Hard limit on how long a job may stay non-terminal.
pub const DEFAULT_JOB_DEADLINE: Duration = Duration::from_secs(600);

pub const DEFAULT_FRAME_COUNT: u32 = 6;
pub const DEFAULT_TOTAL_DURATION: Duration = Duration::from_secs(3);

/// Frames fetched in parallel within one generation.
pub const DEFAULT_FRAME_FETCH_CONCURRENCY: usize = 3;

/// Largest accepted frame edge in pixels.
const MAX_FRAME_EDGE: u32 = 4096;

// ---------------------------------------------------------------------------
// GenerationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    pub placeholder_color: [u8; 3],
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub attempt_timeout: Duration,
    pub poll_interval: Duration,
    pub job_deadline: Duration,
    pub fps: u32,
    pub frame_count: u32,
    pub total_duration: Duration,
    pub backend_kind: BackendKind,
    pub frame_fetch_concurrency: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
            placeholder_color: DEFAULT_PLACEHOLDER_COLOR,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_deadline: DEFAULT_JOB_DEADLINE,
            fps: DEFAULT_FPS,
            frame_count: DEFAULT_FRAME_COUNT,
            total_duration: DEFAULT_TOTAL_DURATION,
            backend_kind: BackendKind::FrameBased,
            frame_fetch_concurrency: DEFAULT_FRAME_FETCH_CONCURRENCY,
        }
    }
}

impl GenerationConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.backoff_base)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (name, edge) in [("frame_width", self.frame_width), ("frame_height", self.frame_height)] {
            if edge == 0 || edge > MAX_FRAME_EDGE {
                return Err(CoreError::Validation(format!(
                    "{name} must be between 1 and {MAX_FRAME_EDGE}"
                )));
            }
        }
        // yuv420p needs even dimensions.
        if self.frame_width % 2 != 0 || self.frame_height % 2 != 0 {
            return Err(CoreError::Validation(
                "Frame dimensions must be even".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(CoreError::Validation(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.attempt_timeout.is_zero() {
            return Err(CoreError::Validation(
                "attempt_timeout must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(CoreError::Validation(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.fps == 0 {
            return Err(CoreError::Validation("fps must be greater than zero".to_string()));
        }
        if self.frame_count == 0 || self.frame_count > MAX_FRAME_COUNT {
            return Err(CoreError::Validation(format!(
                "frame_count must be between 1 and {MAX_FRAME_COUNT}"
            )));
        }
        if self.total_duration.is_zero() || self.total_duration > MAX_TOTAL_DURATION {
            return Err(CoreError::Validation(format!(
                "total_duration must be between 0 and {}s",
                MAX_TOTAL_DURATION.as_secs()
            )));
        }
        let capacity = encoder_frames(self.total_duration, self.fps);
        if u64::from(self.frame_count) > capacity {
            return Err(CoreError::Validation(format!(
                "frame_count {} exceeds the {capacity} encoder frames in {}s at {} fps",
                self.frame_count,
                self.total_duration.as_secs_f64(),
                self.fps
            )));
        }
        if self.frame_fetch_concurrency == 0 {
            return Err(CoreError::Validation(
                "frame_fetch_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
