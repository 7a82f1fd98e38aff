//! Chat notification with fixed-delay retry.
//!
//! [`SlackNotifier`] posts a plain-text message to a channel through the
//! `chat.postMessage` Web API. Failed attempts are retried after 1 s, 2 s
//! and 4 s before giving up.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

/// Retry delays (exponential backoff: 1s, 2s, 4s).
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// HTTP request timeout for a single post attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Slack returned HTTP {0}")]
    HttpStatus(u16),

    /// HTTP 200 with `"ok": false`.
    #[error("Slack API error: {0}")]
    Api(String),
}

/// Posts a text message to a channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post(&self, channel: &str, text: &str) -> Result<(), NotifyError>;
}

// ---------------------------------------------------------------------------
// SlackNotifier
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackNotifier {
    client: reqwest::Client,
    token: String,
    api_base: String,
    retry_delays: Vec<Duration>,
}

impl SlackNotifier {
    pub fn new(client: reqwest::Client, token: impl Into<String>) -> Self {
        Self {
            client,
            token: token.into(),
            api_base: DEFAULT_SLACK_API_BASE.to_string(),
            retry_delays: RETRY_DELAYS.to_vec(),
        }
    }

    /// Point at a different API root (e.g. a mock server).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Client with the per-attempt timeout applied.
    pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()
    }

    /// Execute a single POST and check both HTTP status and the `ok` flag.
    async fn try_post(&self, payload: &serde_json::Value) -> Result<(), NotifyError> {
        let url = format!("{}/chat.postMessage", self.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NotifyError::HttpStatus(response.status().as_u16()));
        }
        let body: PostMessageResponse = response.json().await?;
        if !body.ok {
            return Err(NotifyError::Api(
                body.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn post(&self, channel: &str, text: &str) -> Result<(), NotifyError> {
        let payload = serde_json::json!({ "channel": channel, "text": text });

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let err = match self.try_post(&payload).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            let Some(delay) = self.retry_delays.get(attempt - 1).copied() else {
                tracing::error!(channel, attempts = attempt, error = %err, "Slack post failed after all retries");
                return Err(err);
            };
            tracing::warn!(
                channel,
                attempt,
                error = %err,
                "Slack post failed, retrying",
            );
            tokio::time::sleep(delay).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
