//! Outbound collaborators: where finished clips are stored and how the
//! requesting channel is told about them.

pub mod notify;
pub mod storage;
