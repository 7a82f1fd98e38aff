//! Clients for the third-party generation backends.
//!
//! Two backend families are supported: asynchronous job APIs (submit a
//! job, poll it, download the finished video) and synchronous image APIs
//! (one still per request). The job side also carries the candidate
//! probing and polling state machines, which only depend on the
//! [`JobBackend`](job_api::JobBackend) seam so they can be driven by
//! scripted fakes in tests.

pub mod candidate;
pub mod frame_api;
pub mod job_api;
pub mod poller;
pub mod probe;

#[cfg(test)]
pub(crate) mod fakes;
