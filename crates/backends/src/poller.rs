//! Drives an accepted job to a terminal state and fetches its output.
//!
//! The first status request goes out immediately, then one every
//! `poll_interval`. Transient failures (no response, 5xx, 429) switch the
//! wait to exponential backoff; `max_attempts` consecutive transient
//! failures give up. The whole wait is bounded by a deadline and can be
//! aborted through a [`CancellationToken`].

use std::sync::Arc;
use std::time::Duration;

use reelgen_core::backoff::BackoffPolicy;
use reelgen_core::config::DEFAULT_ATTEMPT_TIMEOUT;
use reelgen_core::job::{Job, JobState};
use reelgen_core::result::ErrorKind;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::candidate::BackendCandidate;
use crate::job_api::{bounded, JobApiError, JobBackend};

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Job {job_id} reached state {state}: {detail}")]
    Failed {
        job_id: String,
        state: JobState,
        detail: String,
    },

    #[error("Job {job_id} reached state {state}: {detail}")]
    Cancelled {
        job_id: String,
        state: JobState,
        detail: String,
    },

    #[error("Job {job_id} did not finish within {}s (last state: {last_state})", .deadline.as_secs())]
    Timeout {
        job_id: String,
        deadline: Duration,
        last_state: JobState,
    },

    /// The caller's cancellation token fired.
    #[error("Polling job {job_id} was aborted")]
    Aborted { job_id: String },

    #[error("Job {job_id} status unreachable after {attempts} attempts: {message}")]
    Unreachable {
        job_id: String,
        attempts: u32,
        message: String,
    },

    /// The status endpoint answered with something we cannot act on.
    #[error("Job {job_id} status request rejected: {message}")]
    Rejected { job_id: String, message: String },

    #[error("Job {job_id} reached state Succeeded without an output url")]
    MissingOutput { job_id: String },

    #[error("Fetching output of job {job_id} failed after {attempts} attempts: {message}")]
    OutputFetch {
        job_id: String,
        attempts: u32,
        message: String,
    },
}

impl PollError {
    /// Failure class reported to the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PollError::Failed { .. } | PollError::MissingOutput { .. } => ErrorKind::JobFailed,
            PollError::Cancelled { .. } => ErrorKind::JobCancelled,
            PollError::Timeout { .. } | PollError::Aborted { .. } => ErrorKind::JobTimeout,
            PollError::Unreachable { .. } | PollError::OutputFetch { .. } => {
                ErrorKind::BackendUnreachable
            }
            PollError::Rejected { .. } => ErrorKind::BackendRejected,
        }
    }
}

/// Polling parameters plus the backend seam.
pub struct JobPoller {
    backend: Arc<dyn JobBackend>,
    poll_interval: Duration,
    deadline: Duration,
    backoff: BackoffPolicy,
    max_attempts: u32,
    attempt_timeout: Duration,
}

impl JobPoller {
    pub fn new(
        backend: Arc<dyn JobBackend>,
        poll_interval: Duration,
        deadline: Duration,
        backoff: BackoffPolicy,
        max_attempts: u32,
    ) -> Self {
        Self {
            backend,
            poll_interval,
            deadline,
            backoff,
            max_attempts: max_attempts.max(1),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Limit on a single status request or download.
    pub fn with_attempt_timeout(mut self, limit: Duration) -> Self {
        self.attempt_timeout = limit;
        self
    }

    /// Poll `job` until it is terminal, then download the output bytes.
    ///
    /// Only a job in exactly the `Succeeded` state yields bytes.
    pub async fn run(
        &self,
        candidate: &BackendCandidate,
        mut job: Job,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, PollError> {
        let deadline = Instant::now() + self.deadline;
        let mut failures = 0u32;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(PollError::Aborted { job_id: job.id.clone() });
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(self.timeout(&job));
                }
                r = bounded(self.attempt_timeout, self.backend.status(candidate, &job.id)) => r,
            };

            let wait = match result {
                Ok(reply) => {
                    failures = 0;
                    let next = JobState::from_wire(&reply.status);
                    let previous = job.state();
                    if !job.advance(next, reply.output_url, reply.detail) {
                        tracing::warn!(
                            job_id = %job.id,
                            current = %previous,
                            reported = %reply.status,
                            "Ignoring backward job status",
                        );
                    } else if previous != next {
                        tracing::debug!(job_id = %job.id, from = %previous, to = %next, "Job state changed");
                    }

                    match job.state() {
                        JobState::Succeeded => {
                            let url = job
                                .output_ref()
                                .ok_or_else(|| PollError::MissingOutput {
                                    job_id: job.id.clone(),
                                })?
                                .to_string();
                            tracing::info!(job_id = %job.id, output = %url, "Job succeeded");
                            return self.download(&job.id, &url, cancel).await;
                        }
                        JobState::Failed => {
                            return Err(PollError::Failed {
                                job_id: job.id.clone(),
                                state: JobState::Failed,
                                detail: detail_or_default(&job),
                            });
                        }
                        JobState::Cancelled => {
                            return Err(PollError::Cancelled {
                                job_id: job.id.clone(),
                                state: JobState::Cancelled,
                                detail: detail_or_default(&job),
                            });
                        }
                        JobState::Submitted | JobState::Pending => self.poll_interval,
                    }
                }
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if failures >= self.max_attempts {
                        return Err(PollError::Unreachable {
                            job_id: job.id.clone(),
                            attempts: failures,
                            message: e.to_string(),
                        });
                    }
                    let delay = self.backoff.delay(failures);
                    tracing::warn!(
                        job_id = %job.id,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Job status request failed, retrying",
                    );
                    delay
                }
                Err(e) => {
                    return Err(PollError::Rejected {
                        job_id: job.id.clone(),
                        message: e.to_string(),
                    });
                }
            };

            let wake = (Instant::now() + wait).min(deadline);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(PollError::Aborted { job_id: job.id.clone() });
                }
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    fn timeout(&self, job: &Job) -> PollError {
        PollError::Timeout {
            job_id: job.id.clone(),
            deadline: self.deadline,
            last_state: job.state(),
        }
    }

    /// Fetch the output bytes, retrying transient failures with backoff.
    async fn download(
        &self,
        job_id: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, PollError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(PollError::Aborted { job_id: job_id.to_string() });
                }
                r = bounded(self.attempt_timeout, self.backend.download(url)) => r,
            };

            let error = match result {
                Ok(bytes) if !bytes.is_empty() => return Ok(bytes),
                Ok(_) => JobApiError::Decode("empty output body".to_string()),
                Err(e) => e,
            };

            if !error.is_transient() || attempt >= self.max_attempts {
                return Err(PollError::OutputFetch {
                    job_id: job_id.to_string(),
                    attempts: attempt,
                    message: error.to_string(),
                });
            }

            let delay = self.backoff.delay(attempt);
            tracing::warn!(
                job_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Output download failed, retrying",
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(PollError::Aborted { job_id: job_id.to_string() });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn detail_or_default(job: &Job) -> String {
    job.detail()
        .map(str::to_string)
        .unwrap_or_else(|| "no detail provided".to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
