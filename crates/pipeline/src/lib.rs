//! Generation pipeline: resilient frame fetching, clip assembly, and the
//! orchestrator that ties them to the job-based backend path.

pub mod assembler;
pub mod ffmpeg;
pub mod fetcher;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod fakes;

pub use orchestrator::{Backends, Orchestrator};
