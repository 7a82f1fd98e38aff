//! Client for synchronous image-generation backends.
//!
//! One GET per still: the prompt is a path segment and a random numeric
//! seed is passed as a query parameter so a backend-side cache cannot hand
//! back the same image on retry.

use async_trait::async_trait;

/// Errors from a single image fetch.
#[derive(Debug, thiserror::Error)]
pub enum FrameApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, ...).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Image API error ({status}): {body}")]
    Status { status: u16, body: String },

    /// The backend returned an empty body.
    #[error("Image API returned an empty body")]
    Empty,

    #[error("Invalid image API URL: {0}")]
    InvalidUrl(String),
}

/// A source of raw (still encoded) image bytes for a prompt.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn fetch(&self, prompt: &str, seed: u64) -> Result<Vec<u8>, FrameApiError>;
}

/// HTTP implementation of [`FrameSource`].
pub struct HttpFrameSource {
    client: reqwest::Client,
    base_url: String,
    width: u32,
    height: u32,
}

impl HttpFrameSource {
    /// * `base_url` - prompt endpoint, e.g. `https://image.example.com/prompt`.
    /// * `width` / `height` - size hint passed to the backend.
    pub fn new(client: reqwest::Client, base_url: String, width: u32, height: u32) -> Self {
        Self {
            client,
            base_url,
            width,
            height,
        }
    }

    /// Build `<base>/<prompt>?seed=..&width=..&height=..&nologo=true`, with
    /// the prompt percent-encoded as a single path segment.
    pub fn frame_url(&self, prompt: &str, seed: u64) -> Result<reqwest::Url, FrameApiError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| FrameApiError::InvalidUrl(format!("{}: {e}", self.base_url)))?;

        url.path_segments_mut()
            .map_err(|_| FrameApiError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(prompt);

        url.query_pairs_mut()
            .append_pair("seed", &seed.to_string())
            .append_pair("width", &self.width.to_string())
            .append_pair("height", &self.height.to_string())
            .append_pair("nologo", "true");

        Ok(url)
    }
}

#[async_trait]
impl FrameSource for HttpFrameSource {
    async fn fetch(&self, prompt: &str, seed: u64) -> Result<Vec<u8>, FrameApiError> {
        let url = self.frame_url(prompt, seed)?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(FrameApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(FrameApiError::Empty);
        }
        Ok(bytes.to_vec())
    }
}
