//! Clip timing: how long each frame is shown and how long the lead-in fade
//! lasts.
//!
//! Every frame gets the same nominal share `total / n` of the clip. The
//! encoder works in whole frames at a fixed rate, so the nominal shares are
//! quantised with cumulative rounding: frame `i` covers encoder frames
//! `round(i*T/n) .. round((i+1)*T/n)` where `T = round(total * fps)`. The
//! spans always sum to `T`, which keeps the encoded duration within one
//! encoder frame of `total`.

use std::time::Duration;

use crate::error::CoreError;

/// Default output frame rate.
pub const DEFAULT_FPS: u32 = 24;

/// Timing plan for one clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipTiming {
    /// Nominal display time of each frame (`total / n`).
    pub per_frame: Duration,
    /// Length of the single fade-in at the start of the clip (`per_frame / 2`).
    pub fade_in: Duration,
    /// Requested clip length.
    pub total: Duration,
    /// Output frame rate.
    pub fps: u32,
    /// Encoder frames covered by each still, in ordinal order.
    pub spans: Vec<u32>,
}

impl ClipTiming {
    /// Plan timing for `frame_count` stills over `total` at `fps`.
    pub fn plan(frame_count: usize, total: Duration, fps: u32) -> Result<Self, CoreError> {
        if frame_count == 0 {
            return Err(CoreError::Validation(
                "A clip needs at least one frame".to_string(),
            ));
        }
        if total.is_zero() {
            return Err(CoreError::Validation(
                "Clip duration must be greater than zero".to_string(),
            ));
        }
        if fps == 0 {
            return Err(CoreError::Validation(
                "Frame rate must be greater than zero".to_string(),
            ));
        }

        let n = frame_count as u64;
        let total_frames = encoder_frames(total, fps);
        if n > total_frames {
            return Err(CoreError::Validation(format!(
                "{n} frames do not fit in {total_frames} encoder frames ({}s at {fps} fps)",
                total.as_secs_f64()
            )));
        }
        let boundary = |i: u64| -> u64 { (i * total_frames * 2 + n) / (2 * n) };
        let spans = (0..n)
            .map(|i| (boundary(i + 1) - boundary(i)) as u32)
            .collect();

        let per_frame = total / frame_count as u32;
        Ok(Self {
            per_frame,
            fade_in: per_frame / 2,
            total,
            fps,
            spans,
        })
    }

    /// Total encoder frames in the output.
    pub fn total_frames(&self) -> u64 {
        self.spans.iter().map(|&s| u64::from(s)).sum()
    }

    /// Duration of the encoded output.
    pub fn encoded_duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_frames() as f64 / f64::from(self.fps))
    }

    /// Display time of one still after quantisation.
    pub fn span_duration(&self, index: usize) -> Duration {
        let frames = self.spans.get(index).copied().unwrap_or(0);
        Duration::from_secs_f64(f64::from(frames) / f64::from(self.fps))
    }

    /// Duration of a single encoder frame (the rounding tolerance).
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps))
    }
}

/// `round(total * fps)`, but never less than one frame. A clip can show at
/// most this many stills.
pub fn encoder_frames(total: Duration, fps: u32) -> u64 {
    let nanos = total.as_nanos();
    let frames = (nanos * u128::from(fps) + 500_000_000) / 1_000_000_000;
    (frames as u64).max(1)
}
