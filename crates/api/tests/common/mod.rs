#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use reelgen_api::config::ServerConfig;
use reelgen_api::router::build_app_router;
use reelgen_api::state::AppState;
use reelgen_cloud::notify::{Notifier, NotifyError};
use reelgen_cloud::storage::{PublishError, VideoPublisher};
use reelgen_core::config::GenerationConfig;
use reelgen_core::generation::GenerationRequest;
use reelgen_core::result::GenerationResult;
use reelgen_worker::{Delivery, Generator, PoolConfig, WorkerPool};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub const CLIP_URL: &str = "https://clips.s3.ap-south-1.amazonaws.com/video-1-deadbeef.mp4";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Records prompts; each generation waits for a permit.
pub struct FakeGenerator {
    gate: Semaphore,
    prompts: Mutex<Vec<String>>,
    started: AtomicUsize,
}

impl FakeGenerator {
    pub fn new(open: bool) -> Self {
        Self {
            gate: Semaphore::new(if open { Semaphore::MAX_PERMITS } else { 0 }),
            prompts: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn release(&self) {
        self.gate.add_permits(1024);
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationResult {
        self.prompts.lock().unwrap().push(request.prompt().to_string());
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = cancel.cancelled() => GenerationResult::Video { bytes: Vec::new() },
            _ = self.gate.acquire() => GenerationResult::Video { bytes: b"mp4".to_vec() },
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    posts: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn posts(&self) -> Vec<(String, String)> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn post(&self, channel: &str, text: &str) -> Result<(), NotifyError> {
        self.posts
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }
}

pub struct FixedPublisher;

#[async_trait]
impl VideoPublisher for FixedPublisher {
    async fn publish(&self, _bytes: Vec<u8>) -> Result<String, PublishError> {
        Ok(CLIP_URL.to_string())
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
    }
}

pub struct TestApp {
    pub router: Router,
    pub generator: Arc<FakeGenerator>,
    pub notifier: Arc<RecordingNotifier>,
    pub pool: WorkerPool,
}

/// Full router plus a live worker pool backed by fakes.
pub fn build_test_app(pool_config: PoolConfig, open: bool) -> TestApp {
    let generator = Arc::new(FakeGenerator::new(open));
    let notifier = Arc::new(RecordingNotifier::default());
    let delivery = Arc::new(Delivery::new(
        Arc::new(FixedPublisher),
        Arc::clone(&notifier) as Arc<dyn Notifier>,
    ));
    let (pool, queue) = WorkerPool::start(
        pool_config,
        Arc::clone(&generator) as Arc<dyn Generator>,
        Arc::clone(&delivery),
        CancellationToken::new(),
    );

    let config = test_config();
    let state = AppState {
        generation: Arc::new(GenerationConfig::default()),
        queue,
        delivery,
    };

    TestApp {
        router: build_app_router(state, &config),
        generator,
        notifier,
        pool,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    post_raw(app, uri, body.to_string(), &[]).await
}

pub async fn post_raw(
    app: &Router,
    uri: &str,
    body: String,
    headers: &[(&str, &str)],
) -> Response<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    app.clone()
        .oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll until the notifier has seen `n` posts.
pub async fn wait_for_posts(notifier: &RecordingNotifier, n: usize) -> Vec<(String, String)> {
    for _ in 0..400 {
        let posts = notifier.posts();
        if posts.len() >= n {
            return posts;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {n} posts, got {:?}", notifier.posts());
}

pub async fn wait_for_started(generator: &FakeGenerator, n: usize) {
    for _ in 0..400 {
        if generator.started() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {n} generations to start, got {}", generator.started());
}
