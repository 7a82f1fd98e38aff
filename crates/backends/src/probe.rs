//! Endpoint probing across backend candidates.
//!
//! Candidates are tried strictly in priority order. A candidate either
//! accepts the job (stop, start polling), reports a version mismatch
//! (fall through to the next candidate), or rejects the request (abort:
//! the request itself is bad, so no other candidate is contacted).
//!
//! A submit that gets no response at all is retried on the same candidate
//! with exponential backoff before the probe gives up.

use std::sync::Arc;
use std::time::Duration;

use reelgen_core::backoff::BackoffPolicy;
use reelgen_core::config::DEFAULT_ATTEMPT_TIMEOUT;
use reelgen_core::job::Job;
use reelgen_core::result::ErrorKind;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::candidate::BackendCandidate;
use crate::job_api::{bounded, parse_job_id, JobApiError, JobBackend, SubmitReply};

/// Longest slice of a response body kept in error messages.
const MAX_BODY_IN_MESSAGE: usize = 512;

// ---------------------------------------------------------------------------
// Version-mismatch contract
// ---------------------------------------------------------------------------

/// How a backend signals that the request shape or API version is wrong
/// for this endpoint (as opposed to the request itself being invalid).
///
/// A response is a mismatch when its status is in `statuses` AND its body
/// contains one of `markers` (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMismatchRule {
    pub statuses: Vec<u16>,
    pub markers: Vec<String>,
}

impl Default for VersionMismatchRule {
    fn default() -> Self {
        Self {
            statuses: vec![400, 404, 410, 422],
            markers: vec![
                "version".to_string(),
                "unsupported api".to_string(),
                "unknown endpoint".to_string(),
            ],
        }
    }
}

impl VersionMismatchRule {
    pub fn matches(&self, status: u16, body: &str) -> bool {
        if !self.statuses.contains(&status) {
            return false;
        }
        let body = body.to_ascii_lowercase();
        self.markers
            .iter()
            .any(|m| body.contains(&m.to_ascii_lowercase()))
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Result of submitting to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    Accepted { job_id: String },
    VersionMismatch { status: u16, body: String },
    Rejected { status: u16, body: String },
}

/// Classify a submit response.
///
/// A 2xx without a usable `id` is a rejection: the backend took the
/// request but gave us nothing to poll.
pub fn classify_submit(reply: &SubmitReply, rule: &VersionMismatchRule) -> CandidateOutcome {
    if (200..300).contains(&reply.status) {
        return match parse_job_id(&reply.body) {
            Some(job_id) => CandidateOutcome::Accepted { job_id },
            None => CandidateOutcome::Rejected {
                status: reply.status,
                body: format!("response carried no job id: {}", clip(&reply.body)),
            },
        };
    }
    if rule.matches(reply.status, &reply.body) {
        return CandidateOutcome::VersionMismatch {
            status: reply.status,
            body: clip(&reply.body),
        };
    }
    CandidateOutcome::Rejected {
        status: reply.status,
        body: clip(&reply.body),
    }
}

fn clip(body: &str) -> String {
    if body.len() <= MAX_BODY_IN_MESSAGE {
        return body.to_string();
    }
    let mut end = MAX_BODY_IN_MESSAGE;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// A candidate answered with a non-success, non-mismatch response.
    #[error("Backend '{candidate}' rejected the job (HTTP {status}): {body}")]
    Rejected {
        candidate: String,
        status: u16,
        body: String,
    },

    /// Every candidate reported a version mismatch (or none were configured).
    #[error("No usable backend: all {tried} candidates reported a version mismatch")]
    NoUsableBackend { tried: usize },

    /// Submit got no response after exhausting retries.
    #[error("Backend '{candidate}' unreachable after {attempts} attempts: {message}")]
    Unreachable {
        candidate: String,
        attempts: u32,
        message: String,
    },

    /// The candidate itself is malformed (e.g. an invalid header).
    #[error("Backend '{candidate}' is misconfigured: {message}")]
    Misconfigured { candidate: String, message: String },

    #[error("Probe cancelled")]
    Cancelled,
}

impl ProbeError {
    /// Failure class reported to the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProbeError::Rejected { .. } | ProbeError::Misconfigured { .. } => {
                ErrorKind::BackendRejected
            }
            ProbeError::NoUsableBackend { .. } => ErrorKind::NoUsableBackend,
            ProbeError::Unreachable { .. } => ErrorKind::BackendUnreachable,
            ProbeError::Cancelled => ErrorKind::JobTimeout,
        }
    }
}

// ---------------------------------------------------------------------------
// EndpointProbe
// ---------------------------------------------------------------------------

/// A job accepted by one of the candidates.
#[derive(Debug, Clone)]
pub struct AcceptedJob {
    pub candidate: BackendCandidate,
    pub job: Job,
}

/// Walks the candidate list until one accepts a job.
pub struct EndpointProbe {
    backend: Arc<dyn JobBackend>,
    candidates: Arc<[BackendCandidate]>,
    rule: VersionMismatchRule,
    backoff: BackoffPolicy,
    max_attempts: u32,
    attempt_timeout: Duration,
}

impl EndpointProbe {
    pub fn new(
        backend: Arc<dyn JobBackend>,
        candidates: Vec<BackendCandidate>,
        rule: VersionMismatchRule,
        backoff: BackoffPolicy,
        max_attempts: u32,
    ) -> Self {
        Self {
            backend,
            candidates: candidates.into(),
            rule,
            backoff,
            max_attempts: max_attempts.max(1),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Limit on a single submit call.
    pub fn with_attempt_timeout(mut self, limit: Duration) -> Self {
        self.attempt_timeout = limit;
        self
    }

    pub fn candidates(&self) -> &[BackendCandidate] {
        &self.candidates
    }

    /// Submit `prompt` to the first candidate that accepts it.
    pub async fn probe(
        &self,
        prompt: &str,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<AcceptedJob, ProbeError> {
        for (index, candidate) in self.candidates.iter().enumerate() {
            let body = candidate.render_payload(prompt, duration);
            let reply = self.submit_with_retry(candidate, &body, cancel).await?;

            match classify_submit(&reply, &self.rule) {
                CandidateOutcome::Accepted { job_id } => {
                    tracing::info!(
                        candidate = %candidate.name,
                        priority = index,
                        job_id = %job_id,
                        "Backend candidate accepted job",
                    );
                    return Ok(AcceptedJob {
                        candidate: candidate.clone(),
                        job: Job::submitted(job_id),
                    });
                }
                CandidateOutcome::VersionMismatch { status, body } => {
                    tracing::warn!(
                        candidate = %candidate.name,
                        status,
                        body = %body,
                        "Backend candidate reported version mismatch, trying next",
                    );
                }
                CandidateOutcome::Rejected { status, body } => {
                    tracing::error!(
                        candidate = %candidate.name,
                        status,
                        body = %body,
                        "Backend candidate rejected job",
                    );
                    return Err(ProbeError::Rejected {
                        candidate: candidate.name.clone(),
                        status,
                        body,
                    });
                }
            }
        }

        Err(ProbeError::NoUsableBackend {
            tried: self.candidates.len(),
        })
    }

    /// Submit once, retrying only when no response came back.
    async fn submit_with_retry(
        &self,
        candidate: &BackendCandidate,
        body: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<SubmitReply, ProbeError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
                r = bounded(self.attempt_timeout, self.backend.submit(candidate, body)) => r,
            };

            match result {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_transient() => {
                    if attempt >= self.max_attempts {
                        return Err(ProbeError::Unreachable {
                            candidate: candidate.name.clone(),
                            attempts: attempt,
                            message: e.to_string(),
                        });
                    }
                    let delay = self.backoff.delay(attempt);
                    tracing::warn!(
                        candidate = %candidate.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Job submit failed, retrying",
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e @ (JobApiError::InvalidHeader(_) | JobApiError::Decode(_))) => {
                    return Err(ProbeError::Misconfigured {
                        candidate: candidate.name.clone(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    return Err(ProbeError::Unreachable {
                        candidate: candidate.name.clone(),
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
