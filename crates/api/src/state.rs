use std::sync::Arc;

use reelgen_core::config::GenerationConfig;
use reelgen_worker::{Delivery, WorkQueue};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind `Arc` or is a channel handle.
#[derive(Clone)]
pub struct AppState {
    /// Frame count, duration, and backend kind for chat-triggered requests.
    pub generation: Arc<GenerationConfig>,
    /// Submission side of the worker pool.
    pub queue: WorkQueue,
    /// Used directly only to post the busy notice when the queue is full.
    pub delivery: Arc<Delivery>,
}
