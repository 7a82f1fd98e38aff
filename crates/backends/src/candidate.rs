//! Backend candidates: one fixed combination of URL, headers, and payload
//! shape tried against a job-based backend.
//!
//! Deployments of the same job API differ in path, version header, and
//! body layout. The candidate list is ordered by priority and never
//! mutated at runtime; the probe walks it until one candidate accepts a
//! job.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Template leaf replaced by the prompt text.
pub const PROMPT_PLACEHOLDER: &str = "{{prompt}}";

/// Template leaf replaced by the clip duration in seconds (as a number).
pub const DURATION_PLACEHOLDER: &str = "{{duration}}";

/// Header-value placeholder replaced by the API token when loading a
/// candidate file.
pub const TOKEN_PLACEHOLDER: &str = "{{token}}";

/// Errors from loading a candidate list.
#[derive(Debug, thiserror::Error)]
pub enum CandidateError {
    #[error("Invalid candidate list: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Candidate list is empty")]
    Empty,

    #[error("Candidate '{0}' has an empty base_url")]
    MissingUrl(String),
}

/// One way of talking to a job-based backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendCandidate {
    /// Short label used in logs and error messages.
    pub name: String,
    /// Submit endpoint. Job status lives at `<base_url>/<id>`.
    pub base_url: String,
    /// Extra request headers (credential, API version, ...).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// JSON body with [`PROMPT_PLACEHOLDER`] / [`DURATION_PLACEHOLDER`] leaves.
    pub payload_template: serde_json::Value,
}

impl BackendCandidate {
    /// Substitute the prompt and duration into the payload template.
    pub fn render_payload(&self, prompt: &str, duration: Duration) -> serde_json::Value {
        render(&self.payload_template, prompt, duration_value(duration))
    }

    /// Status URL for a job accepted by this candidate.
    pub fn job_url(&self, job_id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), job_id)
    }
}

fn render(
    template: &serde_json::Value,
    prompt: &str,
    duration: serde_json::Value,
) -> serde_json::Value {
    use serde_json::Value;

    match template {
        Value::String(s) if s == PROMPT_PLACEHOLDER => Value::String(prompt.to_string()),
        Value::String(s) if s == DURATION_PLACEHOLDER => duration,
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| render(v, prompt, duration.clone()))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render(v, prompt, duration.clone())))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Whole seconds render as an integer, anything else as a float.
fn duration_value(duration: Duration) -> serde_json::Value {
    if duration.subsec_nanos() == 0 {
        serde_json::Value::from(duration.as_secs())
    } else {
        serde_json::Value::from(duration.as_secs_f64())
    }
}

/// Built-in candidate list for a job API rooted at `api_base`.
///
/// Ordered newest API first: versioned v2, versioned v1, then the legacy
/// unversioned endpoint that nests its inputs.
pub fn default_candidates(api_base: &str, token: &str, model: &str) -> Vec<BackendCandidate> {
    let base = api_base.trim_end_matches('/');
    let auth = format!("Bearer {token}");

    let headers = |version: Option<&str>| {
        let mut h = BTreeMap::new();
        h.insert("Authorization".to_string(), auth.clone());
        h.insert("Content-Type".to_string(), "application/json".to_string());
        if let Some(v) = version {
            h.insert("X-Api-Version".to_string(), v.to_string());
        }
        h
    };

    let flat = serde_json::json!({
        "prompt": PROMPT_PLACEHOLDER,
        "duration": DURATION_PLACEHOLDER,
        "model": model,
    });

    vec![
        BackendCandidate {
            name: "v2".to_string(),
            base_url: format!("{base}/v2/generations"),
            headers: headers(Some("2")),
            payload_template: flat.clone(),
        },
        BackendCandidate {
            name: "v1".to_string(),
            base_url: format!("{base}/v1/generations"),
            headers: headers(Some("1")),
            payload_template: flat,
        },
        BackendCandidate {
            name: "legacy".to_string(),
            base_url: format!("{base}/generations"),
            headers: headers(None),
            payload_template: serde_json::json!({
                "model": model,
                "input": {
                    "prompt": PROMPT_PLACEHOLDER,
                    "duration": DURATION_PLACEHOLDER,
                },
            }),
        },
    ]
}

/// Parse a JSON array of candidates, substituting [`TOKEN_PLACEHOLDER`] in
/// header values with `token`.
pub fn load_candidates(json: &str, token: &str) -> Result<Vec<BackendCandidate>, CandidateError> {
    let mut candidates: Vec<BackendCandidate> = serde_json::from_str(json)?;
    if candidates.is_empty() {
        return Err(CandidateError::Empty);
    }
    for candidate in &mut candidates {
        if candidate.base_url.trim().is_empty() {
            return Err(CandidateError::MissingUrl(candidate.name.clone()));
        }
        for value in candidate.headers.values_mut() {
            if value.contains(TOKEN_PLACEHOLDER) {
                *value = value.replace(TOKEN_PLACEHOLDER, token);
            }
        }
    }
    Ok(candidates)
}
