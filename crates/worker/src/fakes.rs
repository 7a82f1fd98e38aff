//! Test doubles for the pool and delivery tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reelgen_cloud::notify::{Notifier, NotifyError};
use reelgen_cloud::storage::{PublishError, VideoPublisher};
use reelgen_core::generation::GenerationRequest;
use reelgen_core::result::{ErrorKind, GenerationResult};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::pool::Generator;

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    posts: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn posts(&self) -> Vec<(String, String)> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn post(&self, channel: &str, text: &str) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::HttpStatus(503));
        }
        self.posts
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }
}

pub(crate) struct StaticPublisher {
    url: Option<String>,
}

impl StaticPublisher {
    pub fn ok(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { url: None }
    }
}

#[async_trait]
impl VideoPublisher for StaticPublisher {
    async fn publish(&self, _bytes: Vec<u8>) -> Result<String, PublishError> {
        self.url.clone().ok_or_else(|| PublishError::Upload {
            key: "video-0-00000000.mp4".into(),
            message: "AccessDenied".into(),
        })
    }
}

const OPEN_PERMITS: usize = 1024;

/// Blocks every generation until released (or cancelled).
pub(crate) struct GatedGenerator {
    gate: Semaphore,
    started: AtomicUsize,
}

impl GatedGenerator {
    pub fn open() -> Self {
        Self {
            gate: Semaphore::new(OPEN_PERMITS),
            started: AtomicUsize::new(0),
        }
    }

    pub fn closed() -> Self {
        Self {
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
        }
    }

    pub fn release(&self) {
        self.gate.add_permits(OPEN_PERMITS);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn wait_started(&self, n: usize) {
        while self.started.load(Ordering::SeqCst) < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Generator for GatedGenerator {
    async fn generate(
        &self,
        _request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationResult {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = cancel.cancelled() => {
                GenerationResult::failed(ErrorKind::JobTimeout, "cancelled")
            }
            _ = self.gate.acquire() => GenerationResult::Video { bytes: vec![0] },
        }
    }
}
