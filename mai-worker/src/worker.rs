//! Worker loop
//!
//! One cycle: list pending, claim the first entry, parse its descriptor,
//! resolve the artifact, run the pipeline, commit a success or failure record.
//! Cycles run one at a time on a blocking task; the async side only sleeps
//! between cycles and watches for cancellation.

use crate::config::WorkerConfig;
use crate::error::{JobError, QueueError};
use crate::pipeline::types::ResultEnvelope;
use crate::pipeline::Pipeline;
use crate::queue::record::{raw_job_value, JobDescriptor};
use crate::queue::{ClaimedJob, JobQueue};
use crate::uploads::resolve_artifact;
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result of one worker cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Nothing pending
    Idle,
    /// The first pending entry disappeared before it could be claimed
    Lost { name: String },
    /// Success record written
    Completed {
        name: String,
        job_id: String,
        record: PathBuf,
    },
    /// Failure record written
    Failed {
        name: String,
        /// `None` when the descriptor could not be parsed
        job_id: Option<String>,
        error: String,
        record: PathBuf,
    },
}

impl CycleOutcome {
    /// Whether the cycle found something to do
    pub fn did_work(&self) -> bool {
        !matches!(self, CycleOutcome::Idle)
    }
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleOutcome::Idle => write!(f, "idle: no pending jobs"),
            CycleOutcome::Lost { name } => write!(f, "lost: {} vanished before claim", name),
            CycleOutcome::Completed { name, record, .. } => {
                write!(f, "completed: {} -> {}", name, record.display())
            }
            CycleOutcome::Failed {
                name,
                error,
                record,
                ..
            } => write!(f, "failed: {} -> {} ({})", name, record.display(), error),
        }
    }
}

/// Queue-draining worker
pub struct Worker {
    queue: JobQueue,
    uploads_dir: PathBuf,
    pipeline: Pipeline,
    busy_interval: Duration,
    idle_interval: Duration,
}

impl Worker {
    pub fn new(queue: JobQueue, uploads_dir: PathBuf, pipeline: Pipeline) -> Self {
        Self {
            queue,
            uploads_dir,
            pipeline,
            busy_interval: Duration::from_millis(500),
            idle_interval: Duration::from_millis(1000),
        }
    }

    /// Open the queue and build the pipeline described by `config`
    pub fn from_config(config: &WorkerConfig) -> anyhow::Result<Self> {
        let queue = JobQueue::open(config.queue.clone()).context("Failed to open job queue")?;
        let pipeline =
            Pipeline::from_config(&config.pipeline).context("Failed to build pipeline")?;

        Ok(Self::new(queue, config.uploads_dir.clone(), pipeline)
            .with_intervals(config.busy_interval, config.idle_interval))
    }

    pub fn with_intervals(mut self, busy_interval: Duration, idle_interval: Duration) -> Self {
        self.busy_interval = busy_interval;
        self.idle_interval = idle_interval;
        self
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Log every processing entry left behind by an earlier run
    pub fn report_stuck(&self) -> Result<usize, QueueError> {
        let stuck = self.queue.stuck()?;
        for entry in &stuck {
            warn!(
                name = %entry.name,
                path = %entry.path.display(),
                "Job left in processing by an earlier run; not requeued"
            );
        }
        Ok(stuck.len())
    }

    /// Run one cycle
    ///
    /// Job-level problems end in a failure record and `Ok`. `Err` means the
    /// queue itself could not be read or written.
    pub fn step_once(&self) -> Result<CycleOutcome, QueueError> {
        let pending = self.queue.list_pending()?;
        let Some(entry) = pending.first() else {
            return Ok(CycleOutcome::Idle);
        };

        let claimed = match self.queue.claim(entry) {
            Ok(claimed) => claimed,
            Err(QueueError::NotFound(path)) => {
                warn!(name = %entry.name, path = %path.display(), "Pending job vanished before claim");
                return Ok(CycleOutcome::Lost {
                    name: entry.name.clone(),
                });
            }
            Err(e) => return Err(e),
        };

        let descriptor = match JobDescriptor::parse(claimed.raw()) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                let job = raw_job_value(claimed.raw());
                return self.fail(&claimed, None, job, &e);
            }
        };

        info!(
            name = %claimed.name(),
            job_id = %descriptor.id,
            upload_id = %descriptor.upload_id,
            "Processing job"
        );

        let envelope = match self.process(&descriptor) {
            Ok(envelope) => envelope,
            Err(e) => {
                let job = job_value(&descriptor, claimed.raw());
                return self.fail(&claimed, Some(descriptor.id.clone()), job, &e);
            }
        };

        match self.queue.commit_success(&claimed, &descriptor, envelope) {
            Ok(record) => {
                info!(name = %claimed.name(), job_id = %descriptor.id, "Job completed");
                Ok(CycleOutcome::Completed {
                    name: claimed.name().to_string(),
                    job_id: descriptor.id,
                    record,
                })
            }
            Err(e) => {
                error!(name = %claimed.name(), job_id = %descriptor.id, error = %e, "Persisting result failed");
                let job = job_value(&descriptor, claimed.raw());
                let id = descriptor.id.clone();
                self.fail(&claimed, Some(id), job, &JobError::Persist(e))
            }
        }
    }

    fn process(&self, descriptor: &JobDescriptor) -> Result<ResultEnvelope, JobError> {
        let artifact = resolve_artifact(&self.uploads_dir, &descriptor.upload_id)?;
        info!(job_id = %descriptor.id, artifact = %artifact.display(), "Artifact resolved");
        Ok(self.pipeline.run(&artifact)?)
    }

    fn fail(
        &self,
        claimed: &ClaimedJob,
        job_id: Option<String>,
        job: serde_json::Value,
        error: &JobError,
    ) -> Result<CycleOutcome, QueueError> {
        let message = error.to_string();
        let record = self.queue.commit_failure(claimed, job, &message)?;

        warn!(
            name = %claimed.name(),
            job_id = job_id.as_deref().unwrap_or("-"),
            error = %message,
            "Job failed"
        );
        Ok(CycleOutcome::Failed {
            name: claimed.name().to_string(),
            job_id,
            error: message,
            record,
        })
    }

    /// Drain the queue until `cancel_token` is cancelled
    ///
    /// Each cycle runs to completion on a blocking thread before the next one
    /// starts. Queue errors are logged and retried after the idle interval.
    pub async fn run(self: Arc<Self>, cancel_token: CancellationToken) {
        info!(
            pending = %self.queue.paths().pending.display(),
            "Worker watching queue"
        );

        let worker = Arc::clone(&self);
        match tokio::task::spawn_blocking(move || worker.report_stuck()).await {
            Ok(Ok(0)) => {}
            Ok(Ok(count)) => warn!(count, "Stuck jobs found in processing"),
            Ok(Err(e)) => warn!(error = %e, "Could not inspect processing directory"),
            Err(e) => error!(error = %e, "Stuck job scan panicked"),
        }

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            let worker = Arc::clone(&self);
            let delay = match tokio::task::spawn_blocking(move || worker.step_once()).await {
                Ok(Ok(outcome)) if outcome.did_work() => self.busy_interval,
                Ok(Ok(_)) => self.idle_interval,
                Ok(Err(e)) => {
                    error!(error = %e, "Queue error");
                    self.idle_interval
                }
                Err(e) => {
                    error!(error = %e, "Worker cycle panicked");
                    self.idle_interval
                }
            };

            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Worker stopped");
    }
}

/// Descriptor as written by the producer, falling back to its re-serialized form
fn job_value(descriptor: &JobDescriptor, raw: &str) -> serde_json::Value {
    serde_json::to_value(descriptor).unwrap_or_else(|_| raw_job_value(raw))
}
