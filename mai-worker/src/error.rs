//! Error types for mai-worker
//!
//! [`QueueError`] covers queue directory operations. [`JobError`] covers
//! everything that makes a single job fail; its `Display` text is what ends up
//! in the failure record's `error` field.

use crate::pipeline::PipelineError;
use crate::queue::JobState;
use std::path::PathBuf;
use thiserror::Error;

/// Queue directory operation error
#[derive(Debug, Error)]
pub enum QueueError {
    /// Filesystem operation on a queue path failed
    #[error("queue I/O error at {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Entry vanished before it could be moved
    #[error("queue entry not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Entry name would leave its state directory
    #[error("invalid queue entry name: {0:?}")]
    InvalidName(String),

    /// Transition not permitted by the job state machine
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: JobState, to: JobState },

    /// Output record could not be serialized
    #[error("cannot serialize output record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Record rename reported success but the file is not there
    #[error("record missing after write: {}", .0.display())]
    VerifyFailed(PathBuf),
}

impl QueueError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| QueueError::Io { path, source }
    }
}

/// Reason a single job failed
#[derive(Debug, Error)]
pub enum JobError {
    /// Descriptor is not valid JSON, lacks required fields, or names an
    /// unusable upload id
    #[error("invalid job descriptor: {0}")]
    InvalidDescriptor(String),

    /// No file in the uploads directory matches the upload id
    #[error("artifact not found for upload {upload_id}")]
    ArtifactNotFound { upload_id: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Result could not be persisted
    #[error("failed to persist result: {0}")]
    Persist(#[source] QueueError),
}
