//! Directory-backed job queue
//!
//! A job is a descriptor file `<name>.json` that lives in exactly one state
//! directory at a time:
//!
//! ```text
//! queue/
//!   pending/     producer drops descriptors here
//!   processing/  claimed by the worker
//!   results/     success records
//!   failed/      failure records
//! ```
//!
//! # State machine
//! `Pending → Processing → Completed | Failed`. Nothing else is legal; there
//! is no retry edge.
//!
//! # Crash safety
//! A claim is a single atomic rename. A commit writes the output record to a
//! temp file in the target directory, fsyncs it, renames it into place,
//! checks it exists and only then removes the processing entry. A crash at
//! any point leaves either the processing entry or the committed record (or
//! both), never a half-written record.

pub mod record;

use crate::error::QueueError;
use crate::pipeline::types::ResultEnvelope;
use record::{JobDescriptor, OutputRecord};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const RECORD_EXTENSION: &str = "json";

/// Lifecycle state of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    /// Every state, in lifecycle order
    pub const ALL: [JobState; 4] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
    ];

    /// Name of the directory holding entries in this state
    pub fn dir_name(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "results",
            JobState::Failed => "failed",
        }
    }

    pub fn can_transition_to(self, to: JobState) -> bool {
        matches!(
            (self, to),
            (JobState::Pending, JobState::Processing)
                | (JobState::Processing, JobState::Completed)
                | (JobState::Processing, JobState::Failed)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn check_transition(from: JobState, to: JobState) -> Result<(), QueueError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(QueueError::IllegalTransition { from, to })
    }
}

/// The four state directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePaths {
    pub pending: PathBuf,
    pub processing: PathBuf,
    pub results: PathBuf,
    pub failed: PathBuf,
}

impl QueuePaths {
    /// Standard layout below `queue_dir`
    pub fn under(queue_dir: &Path) -> Self {
        Self {
            pending: queue_dir.join(JobState::Pending.dir_name()),
            processing: queue_dir.join(JobState::Processing.dir_name()),
            results: queue_dir.join(JobState::Completed.dir_name()),
            failed: queue_dir.join(JobState::Failed.dir_name()),
        }
    }

    pub fn dir(&self, state: JobState) -> &Path {
        match state {
            JobState::Pending => &self.pending,
            JobState::Processing => &self.processing,
            JobState::Completed => &self.results,
            JobState::Failed => &self.failed,
        }
    }
}

/// A descriptor file observed in one state directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// File stem, shared by the entry in every state
    pub name: String,
    pub state: JobState,
    pub path: PathBuf,
}

impl QueueEntry {
    pub fn file_name(&self) -> String {
        record_file_name(&self.name)
    }
}

/// A job moved into `processing/`, with its descriptor text
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    entry: QueueEntry,
    raw: String,
}

impl ClaimedJob {
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn path(&self) -> &Path {
        &self.entry.path
    }

    /// Descriptor text as claimed (lossy UTF-8)
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// File-system job queue
#[derive(Debug, Clone)]
pub struct JobQueue {
    paths: QueuePaths,
}

impl JobQueue {
    /// Open the queue, creating any missing state directory
    pub fn open(paths: QueuePaths) -> Result<Self, QueueError> {
        for state in JobState::ALL {
            let dir = paths.dir(state);
            fs::create_dir_all(dir).map_err(QueueError::io(dir))?;
        }
        debug!(pending = %paths.pending.display(), "Job queue opened");
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &QueuePaths {
        &self.paths
    }

    /// Pending entries in file name order
    ///
    /// Names that could never be claimed (containing a path separator) are
    /// skipped with a warning and left where they are.
    pub fn list_pending(&self) -> Result<Vec<QueueEntry>, QueueError> {
        self.list(JobState::Pending)
    }

    /// Entries currently in `processing/`, whether or not already committed
    pub fn list_processing(&self) -> Result<Vec<QueueEntry>, QueueError> {
        self.list(JobState::Processing)
    }

    /// Processing entries without a committed record
    ///
    /// These are jobs interrupted mid-flight. They are never requeued
    /// automatically.
    pub fn stuck(&self) -> Result<Vec<QueueEntry>, QueueError> {
        Ok(self
            .list_processing()?
            .into_iter()
            .filter(|entry| !self.is_committed(&entry.name))
            .collect())
    }

    /// Claim a pending entry (pending → processing) and read its descriptor
    ///
    /// Fails with [`QueueError::NotFound`] if the entry is no longer pending.
    pub fn claim(&self, entry: &QueueEntry) -> Result<ClaimedJob, QueueError> {
        let path = self.transition(&entry.name, JobState::Pending, JobState::Processing)?;

        let bytes = fs::read(&path).map_err(QueueError::io(&path))?;
        let raw = String::from_utf8_lossy(&bytes).into_owned();

        info!(name = %entry.name, "Claimed job");
        Ok(ClaimedJob {
            entry: QueueEntry {
                name: entry.name.clone(),
                state: JobState::Processing,
                path,
            },
            raw,
        })
    }

    /// Move an entry between state directories by atomic rename
    ///
    /// Returns the entry's new path.
    pub fn transition(&self, name: &str, from: JobState, to: JobState) -> Result<PathBuf, QueueError> {
        check_transition(from, to)?;

        let source = self.entry_path(from, name)?;
        let target = self.entry_path(to, name)?;

        match fs::rename(&source, &target) {
            Ok(()) => {
                debug!(name, %from, %to, "Queue transition");
                Ok(target)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(QueueError::NotFound(source)),
            Err(e) => Err(QueueError::Io { path: source, source: e }),
        }
    }

    /// Persist a success record and clear the processing entry
    pub fn commit_success(
        &self,
        claimed: &ClaimedJob,
        job: &JobDescriptor,
        result: ResultEnvelope,
    ) -> Result<PathBuf, QueueError> {
        let record = OutputRecord::success(job, result)?;
        self.commit(claimed, JobState::Completed, &record)
    }

    /// Persist a failure record and clear the processing entry
    pub fn commit_failure(
        &self,
        claimed: &ClaimedJob,
        job: Value,
        message: &str,
    ) -> Result<PathBuf, QueueError> {
        let record = OutputRecord::failure(job, message);
        self.commit(claimed, JobState::Failed, &record)
    }

    /// Write-new, verify, delete-old
    fn commit(
        &self,
        claimed: &ClaimedJob,
        to: JobState,
        record: &OutputRecord,
    ) -> Result<PathBuf, QueueError> {
        check_transition(claimed.entry.state, to)?;
        let target = self.entry_path(to, claimed.name())?;

        mai_common::fs::write_json_atomic(&target, record).map_err(|e| match e {
            mai_common::Error::Io(source) => QueueError::Io {
                path: target.clone(),
                source,
            },
            mai_common::Error::Json(source) => QueueError::Serialize(source),
            other => QueueError::Io {
                path: target.clone(),
                source: std::io::Error::new(ErrorKind::Other, other.to_string()),
            },
        })?;

        if !target.is_file() {
            return Err(QueueError::VerifyFailed(target));
        }

        // The record is durable from here on; a leftover processing entry only
        // shows up in list_processing(), never in stuck().
        match fs::remove_file(claimed.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(name = claimed.name(), "Processing entry already gone at commit");
            }
            Err(e) => {
                warn!(
                    name = claimed.name(),
                    error = %e,
                    "Record committed but processing entry could not be removed"
                );
            }
        }

        debug!(name = claimed.name(), state = %to, "Committed output record");
        Ok(target)
    }

    /// Current state of `<name>.json`
    ///
    /// Checked in the order results, failed, processing, pending so a
    /// committed record wins over a leftover processing entry. A trailing
    /// `.json` in `name` is accepted.
    pub fn status(&self, name: &str) -> Option<JobState> {
        let name = name.strip_suffix(".json").unwrap_or(name);
        [
            JobState::Completed,
            JobState::Failed,
            JobState::Processing,
            JobState::Pending,
        ]
        .into_iter()
        .find(|state| {
            self.entry_path(*state, name)
                .map(|path| path.is_file())
                .unwrap_or(false)
        })
    }

    /// Read the committed output record for `name`, if any
    pub fn read_record(&self, name: &str) -> Result<Option<OutputRecord>, QueueError> {
        let name = name.strip_suffix(".json").unwrap_or(name);
        for state in [JobState::Completed, JobState::Failed] {
            let path = self.entry_path(state, name)?;
            match fs::read_to_string(&path) {
                Ok(content) => return Ok(Some(serde_json::from_str(&content)?)),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(QueueError::Io { path, source: e }),
            }
        }
        Ok(None)
    }

    fn is_committed(&self, name: &str) -> bool {
        [JobState::Completed, JobState::Failed].into_iter().any(|state| {
            self.entry_path(state, name)
                .map(|path| path.is_file())
                .unwrap_or(false)
        })
    }

    fn entry_path(&self, state: JobState, name: &str) -> Result<PathBuf, QueueError> {
        if !is_valid_name(name) {
            return Err(QueueError::InvalidName(name.to_string()));
        }
        Ok(self.paths.dir(state).join(record_file_name(name)))
    }

    fn list(&self, state: JobState) -> Result<Vec<QueueEntry>, QueueError> {
        let dir = self.paths.dir(state);
        let read_dir = fs::read_dir(dir).map_err(QueueError::io(dir))?;

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(QueueError::io(dir))?;
            let path = dir_entry.path();

            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            // Temp files from in-flight atomic writes
            if name.starts_with('.') {
                continue;
            }
            if !is_valid_name(name) {
                warn!(path = %path.display(), "Skipping queue entry with unusable name");
                continue;
            }

            entries.push(QueueEntry {
                name: name.to_string(),
                state,
                path: path.clone(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

fn record_file_name(name: &str) -> String {
    format!("{}.{}", name, RECORD_EXTENSION)
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
}
