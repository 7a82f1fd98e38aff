//! Top-level generation: one request in, one [`GenerationResult`] out.
//!
//! Job-based requests go probe -> poll -> output download. Frame-based
//! requests go fetch every frame -> assemble. Every failure is classified
//! into an [`ErrorKind`] here; nothing escapes as a raw error.

use std::sync::Arc;

use reelgen_backends::candidate::BackendCandidate;
use reelgen_backends::frame_api::FrameSource;
use reelgen_backends::job_api::JobBackend;
use reelgen_backends::poller::JobPoller;
use reelgen_backends::probe::{EndpointProbe, VersionMismatchRule};
use reelgen_core::config::GenerationConfig;
use reelgen_core::generation::{BackendKind, GenerationRequest};
use reelgen_core::result::{ErrorKind, GenerationResult};
use tokio_util::sync::CancellationToken;

use crate::assembler::ClipEncoder;
use crate::fetcher::FrameFetcher;

/// Everything the orchestrator talks to, injected by the caller.
pub struct Backends {
    pub jobs: Arc<dyn JobBackend>,
    pub candidates: Vec<BackendCandidate>,
    pub mismatch_rule: VersionMismatchRule,
    pub frames: Arc<dyn FrameSource>,
    pub encoder: Arc<dyn ClipEncoder>,
}

pub struct Orchestrator {
    probe: EndpointProbe,
    poller: JobPoller,
    fetcher: FrameFetcher,
    encoder: Arc<dyn ClipEncoder>,
}

impl Orchestrator {
    pub fn new(config: &GenerationConfig, backends: Backends) -> Self {
        let probe = EndpointProbe::new(
            Arc::clone(&backends.jobs),
            backends.candidates,
            backends.mismatch_rule,
            config.backoff(),
            config.max_attempts,
        )
        .with_attempt_timeout(config.attempt_timeout);
        let poller = JobPoller::new(
            backends.jobs,
            config.poll_interval,
            config.job_deadline,
            config.backoff(),
            config.max_attempts,
        )
        .with_attempt_timeout(config.attempt_timeout);
        Self {
            probe,
            poller,
            fetcher: FrameFetcher::new(backends.frames, config),
            encoder: backends.encoder,
        }
    }

    /// Run one generation to completion.
    #[tracing::instrument(
        skip_all,
        fields(
            backend_kind = %request.backend_kind(),
            frame_count = request.frame_count(),
        )
    )]
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationResult {
        let result = match request.backend_kind() {
            BackendKind::JobBased => self.generate_from_job(request, cancel).await,
            BackendKind::FrameBased => self.generate_from_frames(request, cancel).await,
        };

        match &result {
            GenerationResult::Video { bytes } => {
                tracing::info!(bytes = bytes.len(), "Generation succeeded");
            }
            GenerationResult::Failed { kind, message } => {
                tracing::warn!(kind = %kind, message = %message, "Generation failed");
            }
        }
        result
    }

    async fn generate_from_job(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationResult {
        let accepted = match self
            .probe
            .probe(request.prompt(), request.total_duration(), cancel)
            .await
        {
            Ok(accepted) => accepted,
            Err(e) => return GenerationResult::failed(e.kind(), e.to_string()),
        };

        match self
            .poller
            .run(&accepted.candidate, accepted.job, cancel)
            .await
        {
            Ok(bytes) => GenerationResult::Video { bytes },
            Err(e) => GenerationResult::failed(e.kind(), e.to_string()),
        }
    }

    async fn generate_from_frames(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationResult {
        let frames = self
            .fetcher
            .fetch_all(request.prompt(), request.frame_count(), cancel)
            .await;

        match self
            .encoder
            .assemble(&frames, request.total_duration())
            .await
        {
            Ok(bytes) => GenerationResult::Video { bytes },
            Err(e) => GenerationResult::failed(ErrorKind::AssemblyError, e.to_string()),
        }
    }
}
