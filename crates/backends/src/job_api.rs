//! REST client for asynchronous job-based video backends.
//!
//! Wraps the three calls the pipeline needs (submit, status, download)
//! behind the object-safe [`JobBackend`] trait. The HTTP implementation
//! never interprets a submit response: classification into accepted /
//! version mismatch / rejected lives in [`crate::probe`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use crate::candidate::BackendCandidate;

/// Raw response to a submit call. Any status code is returned as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReply {
    pub status: u16,
    pub body: String,
}

/// Parsed job status payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReply {
    /// Backend status string, e.g. `"processing"` or `"succeeded"`.
    pub status: String,
    /// Result location, when the backend reports one.
    pub output_url: Option<String>,
    /// Backend-provided error detail, verbatim.
    pub detail: Option<String>,
}

/// Errors from the job API layer.
#[derive(Debug, thiserror::Error)]
pub enum JobApiError {
    /// No HTTP response at all (connect, DNS, TLS, timeout, ...).
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// The backend answered with a non-2xx status.
    #[error("Job API error ({status}): {body}")]
    Status { status: u16, body: String },

    /// A 2xx response whose body could not be understood.
    #[error("Invalid job API response: {0}")]
    Decode(String),

    /// No response within the per-attempt limit.
    #[error("No response within {}s", .0.as_secs_f64())]
    TimedOut(Duration),

    /// A candidate header could not be turned into an HTTP header.
    #[error("Invalid header '{0}' in candidate")]
    InvalidHeader(String),
}

impl JobApiError {
    /// Whether the same call may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            JobApiError::Transport(_) | JobApiError::TimedOut(_) => true,
            JobApiError::Status { status, .. } => *status >= 500 || *status == 429,
            JobApiError::Decode(_) | JobApiError::InvalidHeader(_) => false,
        }
    }
}

impl From<reqwest::Error> for JobApiError {
    fn from(e: reqwest::Error) -> Self {
        JobApiError::Transport(e.to_string())
    }
}

/// Run one backend call, giving up after `limit`.
pub async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, JobApiError>>,
) -> Result<T, JobApiError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(JobApiError::TimedOut(limit)),
    }
}

/// The calls the probe and poller make against a job backend.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// POST `body` to the candidate's submit endpoint.
    ///
    /// Returns `Err` only when no response was received.
    async fn submit(
        &self,
        candidate: &BackendCandidate,
        body: &serde_json::Value,
    ) -> Result<SubmitReply, JobApiError>;

    /// GET the job's current status.
    async fn status(
        &self,
        candidate: &BackendCandidate,
        job_id: &str,
    ) -> Result<StatusReply, JobApiError>;

    /// Download the finished video from its output reference.
    async fn download(&self, url: &str) -> Result<Vec<u8>, JobApiError>;
}

/// HTTP implementation of [`JobBackend`].
pub struct HttpJobApi {
    client: reqwest::Client,
}

impl HttpJobApi {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    // ---- private helpers ----

    fn headers(candidate: &BackendCandidate) -> Result<HeaderMap, JobApiError> {
        let mut map = HeaderMap::with_capacity(candidate.headers.len());
        for (name, value) in &candidate.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| JobApiError::InvalidHeader(name.clone()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| JobApiError::InvalidHeader(name.clone()))?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }

    /// Return the response unchanged on success, or a
    /// [`JobApiError::Status`] carrying the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, JobApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(JobApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

impl Default for HttpJobApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobBackend for HttpJobApi {
    async fn submit(
        &self,
        candidate: &BackendCandidate,
        body: &serde_json::Value,
    ) -> Result<SubmitReply, JobApiError> {
        let response = self
            .client
            .post(&candidate.base_url)
            .headers(Self::headers(candidate)?)
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Ok(SubmitReply { status, body })
    }

    async fn status(
        &self,
        candidate: &BackendCandidate,
        job_id: &str,
    ) -> Result<StatusReply, JobApiError> {
        let response = self
            .client
            .get(candidate.job_url(job_id))
            .headers(Self::headers(candidate)?)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        parse_status(&text)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, JobApiError> {
        let response = self.client.get(url).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Wire parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    output: serde_json::Value,
    #[serde(default)]
    error: serde_json::Value,
    #[serde(default)]
    detail: serde_json::Value,
}

/// Parse a status payload `{status, output: {url}, error?}`.
///
/// `output` may also be a bare URL string or an array whose first string
/// element is the URL; both shapes occur across deployments.
pub fn parse_status(text: &str) -> Result<StatusReply, JobApiError> {
    let body: StatusBody =
        serde_json::from_str(text).map_err(|e| JobApiError::Decode(format!("{e}: {text}")))?;

    let output_url = match &body.output {
        serde_json::Value::Object(map) => map
            .get("url")
            .and_then(|u| u.as_str())
            .map(str::to_string),
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => items
            .iter()
            .find_map(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    };

    let detail = [&body.error, &body.detail]
        .into_iter()
        .find(|v| !v.is_null())
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        });

    Ok(StatusReply {
        status: body.status,
        output_url,
        detail,
    })
}

/// Extract the job identifier from a successful submit body.
///
/// Accepts string or numeric `id` fields.
pub fn parse_job_id(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("id")? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
