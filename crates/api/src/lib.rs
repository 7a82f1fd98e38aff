//! reelgen API server library.
//!
//! Exposes configuration, shared state, error handling, and the routes so
//! integration tests and the binary entrypoint build the same router.

pub mod config;
pub mod error;
pub mod router;
pub mod routes;
pub mod state;
