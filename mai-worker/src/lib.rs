//! mai-worker library interface
//!
//! Exposes the queue, pipeline and worker loop for the binary and for
//! integration tests.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod uploads;
pub mod worker;

pub use crate::error::{JobError, QueueError};
pub use crate::worker::{CycleOutcome, Worker};
