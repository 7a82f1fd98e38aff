//! Job state machine for asynchronous (job-based) backends.
//!
//! Backends report free-form status strings; [`JobState::from_wire`] maps
//! them onto the five states the poller understands. Transitions are
//! monotonic: a report that would move a job backwards (for example a
//! stale `pending` after `succeeded`) is refused by [`Job::advance`].

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a backend job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    /// Map a backend status string onto a state.
    ///
    /// Unknown non-terminal strings (`"starting"`, `"processing"`, ...) are
    /// treated as `Pending` so new intermediate states never stall polling.
    pub fn from_wire(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "succeeded" | "success" | "successful" | "completed" | "complete" => {
                JobState::Succeeded
            }
            "failed" | "failure" | "error" | "errored" => JobState::Failed,
            "cancelled" | "canceled" | "aborted" => JobState::Cancelled,
            "submitted" | "created" => JobState::Submitted,
            _ => JobState::Pending,
        }
    }

    /// `true` for states from which no further transition occurs.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }

    fn rank(&self) -> u8 {
        match self {
            JobState::Submitted => 0,
            JobState::Pending => 1,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled => 2,
        }
    }

    /// Whether moving from `self` to `next` respects the forward-only order.
    ///
    /// Staying in the same non-terminal state is allowed (a poll that sees
    /// no change). Nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Submitted => "Submitted",
            JobState::Pending => "Pending",
            JobState::Succeeded => "Succeeded",
            JobState::Failed => "Failed",
            JobState::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job accepted by a backend, tracked until it reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    state: JobState,
    output_ref: Option<String>,
    detail: Option<String>,
}

impl Job {
    /// A freshly accepted job.
    pub fn submitted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: JobState::Submitted,
            output_ref: None,
            detail: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Result location; only ever populated in the `Succeeded` state.
    pub fn output_ref(&self) -> Option<&str> {
        self.output_ref.as_deref()
    }

    /// Backend-provided detail for a failed or cancelled job.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Apply a status report. Returns `false` (leaving the job untouched)
    /// when the report would move the job backwards.
    pub fn advance(
        &mut self,
        next: JobState,
        output_ref: Option<String>,
        detail: Option<String>,
    ) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        if next == JobState::Succeeded {
            self.output_ref = output_ref;
        }
        if matches!(next, JobState::Failed | JobState::Cancelled) {
            self.detail = detail;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_statuses_map_to_states() {
        assert_eq!(JobState::from_wire("succeeded"), JobState::Succeeded);
        assert_eq!(JobState::from_wire("FAILED"), JobState::Failed);
        assert_eq!(JobState::from_wire("canceled"), JobState::Cancelled);
        assert_eq!(JobState::from_wire("cancelled"), JobState::Cancelled);
        assert_eq!(JobState::from_wire("starting"), JobState::Pending);
        assert_eq!(JobState::from_wire("processing"), JobState::Pending);
        assert_eq!(JobState::from_wire("submitted"), JobState::Submitted);
    }

    #[test]
    fn terminal_states() {
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Submitted.is_terminal());
    }

    #[test]
    fn backward_transition_refused() {
        let mut job = Job::submitted("abc");
        assert!(job.advance(JobState::Pending, None, None));
        assert!(!job.advance(JobState::Submitted, None, None));
        assert_eq!(job.state(), JobState::Pending);
    }

    #[test]
    fn terminal_state_is_final() {
        let mut job = Job::submitted("abc");
        assert!(job.advance(JobState::Failed, None, Some("oom".into())));
        assert!(!job.advance(JobState::Succeeded, Some("u".into()), None));
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.detail(), Some("oom"));
    }

    #[test]
    fn output_ref_only_kept_on_success() {
        let mut pending = Job::submitted("a");
        pending.advance(JobState::Pending, Some("https://x/early.mp4".into()), None);
        assert_eq!(pending.output_ref(), None);

        let mut done = Job::submitted("b");
        done.advance(JobState::Succeeded, Some("https://x/out.mp4".into()), None);
        assert_eq!(done.output_ref(), Some("https://x/out.mp4"));
    }

    #[test]
    fn submitted_can_jump_straight_to_terminal() {
        assert!(JobState::Submitted.can_transition_to(JobState::Cancelled));
        assert!(JobState::Pending.can_transition_to(JobState::Pending));
    }
}
