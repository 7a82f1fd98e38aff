//! Scripted [`JobBackend`] for probe and poller tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::candidate::BackendCandidate;
use crate::job_api::{JobApiError, JobBackend, StatusReply, SubmitReply};

/// One scripted submit outcome.
#[derive(Debug, Clone)]
pub(crate) enum Submit {
    Reply(u16, &'static str),
    Transport,
    /// Never answers.
    Stall,
}

/// One scripted status outcome.
#[derive(Debug, Clone)]
pub(crate) enum Status {
    State(&'static str),
    Done(&'static str),
    Terminal(&'static str, &'static str),
    Transport,
    Http(u16),
    /// Never answers.
    Stall,
}

/// Replays scripted responses. The last entry of each queue is sticky so a
/// job can be left pending forever.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    submits: Mutex<HashMap<String, VecDeque<Submit>>>,
    statuses: Mutex<VecDeque<Status>>,
    downloads: Mutex<VecDeque<Result<Vec<u8>, u16>>>,
    stall_downloads: AtomicBool,
    pub submit_log: Mutex<Vec<String>>,
    pub status_log: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn on_submit(self, candidate: &str, script: Vec<Submit>) -> Self {
        self.submits
            .lock()
            .unwrap()
            .insert(candidate.to_string(), script.into());
        self
    }

    pub fn with_statuses(self, script: Vec<Status>) -> Self {
        *self.statuses.lock().unwrap() = script.into();
        self
    }

    pub fn with_downloads(self, script: Vec<Result<Vec<u8>, u16>>) -> Self {
        *self.downloads.lock().unwrap() = script.into();
        self
    }

    /// Every download hangs until the caller gives up.
    pub fn with_stalled_downloads(self) -> Self {
        self.stall_downloads.store(true, Ordering::SeqCst);
        self
    }

    pub fn submitted_to(&self) -> Vec<String> {
        self.submit_log.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_log.lock().unwrap().len()
    }
}

fn next<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[async_trait]
impl JobBackend for ScriptedBackend {
    async fn submit(
        &self,
        candidate: &BackendCandidate,
        _body: &serde_json::Value,
    ) -> Result<SubmitReply, JobApiError> {
        self.submit_log.lock().unwrap().push(candidate.name.clone());
        let step = {
            let mut submits = self.submits.lock().unwrap();
            submits.get_mut(&candidate.name).and_then(next)
        };
        match step {
            Some(Submit::Reply(status, body)) => Ok(SubmitReply {
                status,
                body: body.to_string(),
            }),
            Some(Submit::Transport) => Err(JobApiError::Transport("connection reset".into())),
            Some(Submit::Stall) => std::future::pending().await,
            None => Ok(SubmitReply {
                status: 404,
                body: "unscripted".into(),
            }),
        }
    }

    async fn status(
        &self,
        _candidate: &BackendCandidate,
        job_id: &str,
    ) -> Result<StatusReply, JobApiError> {
        self.status_log.lock().unwrap().push(job_id.to_string());
        let step = next(&mut *self.statuses.lock().unwrap());
        match step {
            Some(Status::State(s)) => Ok(StatusReply {
                status: s.to_string(),
                output_url: None,
                detail: None,
            }),
            Some(Status::Done(url)) => Ok(StatusReply {
                status: "succeeded".into(),
                output_url: Some(url.to_string()),
                detail: None,
            }),
            Some(Status::Terminal(s, detail)) => Ok(StatusReply {
                status: s.to_string(),
                output_url: None,
                detail: Some(detail.to_string()),
            }),
            Some(Status::Transport) => Err(JobApiError::Transport("timed out".into())),
            Some(Status::Http(code)) => Err(JobApiError::Status {
                status: code,
                body: "scripted".into(),
            }),
            Some(Status::Stall) => std::future::pending().await,
            None => Ok(StatusReply {
                status: "pending".into(),
                output_url: None,
                detail: None,
            }),
        }
    }

    async fn download(&self, _url: &str) -> Result<Vec<u8>, JobApiError> {
        if self.stall_downloads.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        let step = next(&mut *self.downloads.lock().unwrap());
        match step {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(code)) => Err(JobApiError::Status {
                status: code,
                body: "scripted".into(),
            }),
            None => Ok(b"video".to_vec()),
        }
    }
}

pub(crate) fn candidate(name: &str) -> BackendCandidate {
    BackendCandidate {
        name: name.to_string(),
        base_url: format!("https://backend.test/{name}"),
        headers: Default::default(),
        payload_template: serde_json::json!({"prompt": "{{prompt}}", "duration": "{{duration}}"}),
    }
}
