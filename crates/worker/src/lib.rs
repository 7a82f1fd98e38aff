//! Bounded worker pool that runs generations off the request path and
//! delivers their results to the requesting channel.

pub mod delivery;
pub mod pool;

#[cfg(test)]
pub(crate) mod fakes;

pub use delivery::Delivery;
pub use pool::{Generator, PoolConfig, QueueError, WorkItem, WorkQueue, WorkerPool};
