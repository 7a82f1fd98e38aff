//! Resilient per-frame fetch from a synchronous image backend.
//!
//! Every ordinal gets up to `max_attempts` requests, each with a fresh
//! random seed. A fetch that never succeeds does not fail the clip: the
//! frame is replaced by the previous ordinal's pixels, or by a solid
//! placeholder for ordinal 0. The returned sequence therefore always has
//! exactly the requested number of frames.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use image::imageops::FilterType;
use image::RgbImage;
use reelgen_backends::frame_api::{FrameApiError, FrameSource};
use reelgen_core::backoff::BackoffPolicy;
use reelgen_core::config::GenerationConfig;
use reelgen_core::frame::Frame;
use tokio_util::sync::CancellationToken;

/// Why one attempt produced no usable image.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Fetch(#[from] FrameApiError),

    #[error("Undecodable image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("No response within {}s", .0.as_secs_f64())]
    TimedOut(Duration),
}

pub struct FrameFetcher {
    source: Arc<dyn FrameSource>,
    width: u32,
    height: u32,
    placeholder_color: [u8; 3],
    max_attempts: u32,
    attempt_timeout: Duration,
    backoff: BackoffPolicy,
    concurrency: usize,
}

impl FrameFetcher {
    pub fn new(source: Arc<dyn FrameSource>, config: &GenerationConfig) -> Self {
        Self {
            source,
            width: config.frame_width,
            height: config.frame_height,
            placeholder_color: config.placeholder_color,
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: config.attempt_timeout,
            backoff: config.backoff(),
            concurrency: config.frame_fetch_concurrency.max(1),
        }
    }

    /// Fetch one frame, substituting on exhaustion. Never fails.
    ///
    /// `previous` is the frame at `ordinal - 1`, if any.
    pub async fn fetch(
        &self,
        prompt: &str,
        ordinal: u32,
        previous: Option<&Frame>,
        cancel: &CancellationToken,
    ) -> Frame {
        let image = self.fetch_image(prompt, ordinal, cancel).await;
        self.resolve(ordinal, image, previous)
    }

    /// Fetch `count` frames for `prompt`, in ordinal order.
    ///
    /// Requests for different ordinals run concurrently; fallback
    /// substitution is applied afterwards in ordinal order so that a
    /// failed ordinal always copies its final predecessor.
    pub async fn fetch_all(
        &self,
        prompt: &str,
        count: u32,
        cancel: &CancellationToken,
    ) -> Vec<Frame> {
        let images: Vec<Option<RgbImage>> = stream::iter(0..count)
            .map(|ordinal| self.fetch_image(prompt, ordinal, cancel))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut frames: Vec<Frame> = Vec::with_capacity(images.len());
        for (ordinal, image) in (0..count).zip(images) {
            let frame = self.resolve(ordinal, image, frames.last());
            frames.push(frame);
        }

        let fallbacks = frames.iter().filter(|f| f.is_fallback()).count();
        if fallbacks > 0 {
            tracing::warn!(count, fallbacks, "Some frames were substituted");
        }
        frames
    }

    fn resolve(&self, ordinal: u32, image: Option<RgbImage>, previous: Option<&Frame>) -> Frame {
        match (image, previous) {
            (Some(image), _) => Frame::fetched(ordinal, image),
            (None, Some(previous)) => Frame::substitute(ordinal, previous),
            (None, None) => Frame::placeholder(
                ordinal,
                self.width,
                self.height,
                self.placeholder_color,
            ),
        }
    }

    /// The attempt loop. `None` means every attempt failed or timed out (or
    /// the generation was cancelled).
    async fn fetch_image(
        &self,
        prompt: &str,
        ordinal: u32,
        cancel: &CancellationToken,
    ) -> Option<RgbImage> {
        for attempt in 1..=self.max_attempts {
            let seed = u64::from(rand::random::<u32>());
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                r = self.attempt(prompt, seed) => r,
            };
            match result {
                Ok(image) => return Some(image),
                Err(e) if attempt == self.max_attempts => {
                    tracing::warn!(
                        ordinal,
                        attempts = attempt,
                        error = %e,
                        "Frame fetch exhausted, substituting",
                    );
                }
                Err(e) => {
                    let delay = self.backoff.delay(attempt);
                    tracing::debug!(
                        ordinal,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Frame fetch failed, retrying",
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        None
    }

    async fn attempt(&self, prompt: &str, seed: u64) -> Result<RgbImage, AttemptError> {
        let bytes = tokio::time::timeout(self.attempt_timeout, self.source.fetch(prompt, seed))
            .await
            .map_err(|_| AttemptError::TimedOut(self.attempt_timeout))??;
        Ok(normalize(&bytes, self.width, self.height)?)
    }
}

/// Decode image bytes into RGB pixels of exactly `width x height`.
pub fn normalize(bytes: &[u8], width: u32, height: u32) -> Result<RgbImage, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    if decoded.width() == width && decoded.height() == height {
        return Ok(decoded.to_rgb8());
    }
    Ok(decoded
        .resize_exact(width, height, FilterType::Triangle)
        .to_rgb8())
}
