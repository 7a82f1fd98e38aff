use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reelgen_api::config::AppConfig;
use reelgen_api::router::build_app_router;
use reelgen_api::state::AppState;
use reelgen_backends::frame_api::HttpFrameSource;
use reelgen_backends::job_api::HttpJobApi;
use reelgen_backends::probe::VersionMismatchRule;
use reelgen_cloud::notify::SlackNotifier;
use reelgen_cloud::storage::S3Publisher;
use reelgen_core::generation::BackendKind;
use reelgen_pipeline::assembler::FfmpegAssembler;
use reelgen_pipeline::{ffmpeg, Backends, Orchestrator};
use reelgen_worker::{Delivery, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Connect timeout for backend HTTP calls. Whole calls are bounded per
/// attempt by `ATTEMPT_TIMEOUT_SECS`.
const BACKEND_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelgen_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = AppConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        backend_kind = %config.generation.backend_kind,
        frame_count = config.generation.frame_count,
        "Loaded configuration",
    );

    if !ffmpeg::is_available(Path::new("ffmpeg")).await {
        tracing::warn!("ffmpeg not found on PATH, frame-based generations will fail");
    }

    // --- Backends ---
    let http = reqwest::Client::builder()
        .connect_timeout(BACKEND_CONNECT_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    let candidates = match config.generation.backend_kind {
        BackendKind::JobBased => config
            .backends
            .candidates()
            .context("Failed to load job backend candidates")?,
        BackendKind::FrameBased => Vec::new(),
    };
    tracing::info!(candidates = candidates.len(), "Job backend candidates loaded");

    let orchestrator = Arc::new(Orchestrator::new(
        &config.generation,
        Backends {
            jobs: Arc::new(HttpJobApi::with_client(http.clone())),
            candidates,
            mismatch_rule: VersionMismatchRule::default(),
            frames: Arc::new(HttpFrameSource::new(
                http,
                config.backends.frame_api_base.clone(),
                config.generation.frame_width,
                config.generation.frame_height,
            )),
            encoder: Arc::new(FfmpegAssembler::new(config.generation.fps)),
        },
    ));

    // --- Delivery ---
    let publisher = S3Publisher::connect(&config.storage)
        .await
        .context("Failed to configure S3 publisher")?;
    tracing::info!(bucket = %config.storage.bucket, region = %config.storage.region, "S3 publisher ready");

    let notifier = SlackNotifier::new(
        SlackNotifier::http_client().context("Failed to build Slack HTTP client")?,
        config.slack_bot_token.clone(),
    );
    let delivery = Arc::new(Delivery::new(Arc::new(publisher), Arc::new(notifier)));

    // --- Worker pool ---
    let cancel = CancellationToken::new();
    let (pool, queue) = WorkerPool::start(
        config.pool,
        orchestrator,
        Arc::clone(&delivery),
        cancel.clone(),
    );

    // --- App state ---
    let state = AppState {
        generation: Arc::new(config.generation.clone()),
        queue,
        delivery,
    };
    let app = build_app_router(state, &config.server);

    // --- Start server ---
    let addr = SocketAddr::new(
        config
            .server
            .host
            .parse()
            .with_context(|| format!("Invalid HOST address '{}'", config.server.host))?,
        config.server.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, stopping workers");
    let drain = Duration::from_secs(config.server.shutdown_timeout_secs);
    if tokio::time::timeout(drain, pool.shutdown()).await.is_err() {
        tracing::warn!(timeout_secs = drain.as_secs(), "Worker pool did not stop in time");
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or (on Unix) SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
