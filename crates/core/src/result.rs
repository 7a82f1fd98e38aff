//! Outcome of one generation and the failure taxonomy surfaced to callers.
//!
//! Transient fetch failures and version mismatches are handled inside the
//! pipeline and never appear here; only fatal kinds do.

use std::fmt;

use serde::Serialize;

/// Prefix placed in front of failure messages sent to the chat channel.
pub const FAILURE_PREFIX: &str = "\u{26a0}\u{fe0f} ";

/// Fatal failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A candidate answered with a non-success, non-version-mismatch response.
    BackendRejected,
    /// Every candidate reported a version mismatch.
    NoUsableBackend,
    /// The job reached the `Failed` state.
    JobFailed,
    /// The job reached the `Cancelled` state.
    JobCancelled,
    /// Polling hit its deadline (or was cancelled) before a terminal state.
    JobTimeout,
    /// Transport retries were exhausted on submit, status, or output fetch.
    BackendUnreachable,
    /// The clip encoder failed.
    AssemblyError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BackendRejected => "BackendRejected",
            ErrorKind::NoUsableBackend => "NoUsableBackend",
            ErrorKind::JobFailed => "JobFailed",
            ErrorKind::JobCancelled => "JobCancelled",
            ErrorKind::JobTimeout => "JobTimeout",
            ErrorKind::BackendUnreachable => "BackendUnreachable",
            ErrorKind::AssemblyError => "AssemblyError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Either the encoded clip or a classified failure. Never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Video { bytes: Vec<u8> },
    Failed { kind: ErrorKind, message: String },
}

impl GenerationResult {
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        GenerationResult::Failed {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GenerationResult::Video { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            GenerationResult::Video { .. } => None,
            GenerationResult::Failed { kind, .. } => Some(*kind),
        }
    }
}

/// Text posted to the channel for a failed generation.
pub fn failure_notice(kind: ErrorKind, message: &str) -> String {
    format!("{FAILURE_PREFIX}{kind}: {message}")
}
