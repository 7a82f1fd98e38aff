//! Pure domain types, constants, and validation for reelgen.
//!
//! Everything in this crate is free of I/O so it can be shared by the
//! backend clients, the generation pipeline, the worker pool, and the
//! API server without pulling in a runtime.

pub mod backoff;
pub mod clip;
pub mod config;
pub mod error;
pub mod frame;
pub mod generation;
pub mod job;
pub mod result;
