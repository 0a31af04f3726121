//! Background execution of pipeline runs.
//!
//! Each submitted job runs as its own tokio task; jobs do not wait on each other. The final
//! [`JobStatus`] is recorded per session and delivered once through the job's [`JobTicket`].
//! Finished statuses are kept for [`QueueSettings::status_retention`] and then evicted.

use super::service::ProcessingApi;
use super::types::{IngestJob, ProcessingOutcome};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

const DEFAULT_CAPACITY: usize = 64;
const DEFAULT_STATUS_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Lifecycle of one submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted but not yet started.
    Queued,
    /// Pipeline is running.
    Processing,
    /// Pipeline finished; storage may still have failed, see the outcome.
    Completed(ProcessingOutcome),
    /// Pipeline aborted.
    Failed {
        /// Error message from the aborted stage.
        error: String,
    },
}

impl JobStatus {
    /// Whether the job has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed { .. })
    }
}

/// Submission buffer size and status retention for an [`IngestQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Jobs that may wait for the dispatcher before [`IngestQueue::submit`] waits too.
    pub capacity: usize,
    /// How long a finished job's status stays queryable.
    pub status_retention: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            status_retention: DEFAULT_STATUS_RETENTION,
        }
    }
}

/// Handle returned by [`IngestQueue::submit`]. Dropping it does not cancel the job.
#[derive(Debug)]
pub struct JobTicket {
    session_id: String,
    completion: oneshot::Receiver<JobStatus>,
}

impl JobTicket {
    /// Session the job belongs to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wait for the job to reach a final state.
    pub async fn wait(self) -> JobStatus {
        self.completion.await.unwrap_or_else(|_| JobStatus::Failed {
            error: "ingest worker stopped before the job finished".to_string(),
        })
    }
}

struct QueuedJob {
    job: IngestJob,
    completion: oneshot::Sender<JobStatus>,
}

struct TrackedStatus {
    status: JobStatus,
    finished_at: Option<Instant>,
}

impl TrackedStatus {
    fn new(status: JobStatus) -> Self {
        let finished_at = status.is_terminal().then(Instant::now);
        Self {
            status,
            finished_at,
        }
    }

    fn expired(&self, retention: Duration) -> bool {
        self.finished_at
            .is_some_and(|finished| finished.elapsed() >= retention)
    }
}

type StatusMap = Arc<DashMap<String, TrackedStatus>>;

/// Hands jobs to a dispatcher task and tracks their status by session.
#[derive(Clone)]
pub struct IngestQueue {
    sender: mpsc::Sender<QueuedJob>,
    statuses: StatusMap,
    retention: Duration,
}

impl IngestQueue {
    /// Spawn the dispatcher with default settings.
    pub fn start(processor: Arc<dyn ProcessingApi>) -> Self {
        Self::start_with(processor, QueueSettings::default())
    }

    /// Spawn the dispatcher on the current runtime and return a handle to it.
    pub fn start_with(processor: Arc<dyn ProcessingApi>, settings: QueueSettings) -> Self {
        let (sender, receiver) = mpsc::channel(settings.capacity.max(1));
        let statuses = StatusMap::default();
        tokio::spawn(dispatch(receiver, processor, statuses.clone()));
        tracing::debug!(
            capacity = settings.capacity,
            retention_secs = settings.status_retention.as_secs(),
            "Ingest queue started"
        );
        Self {
            sender,
            statuses,
            retention: settings.status_retention,
        }
    }

    /// Schedule `job` and return its completion ticket.
    ///
    /// Waits while the submission buffer is full.
    pub async fn submit(&self, job: IngestJob) -> JobTicket {
        self.evict_expired();
        let session_id = job.session_id.clone();
        let (completion, receiver) = oneshot::channel();
        self.statuses
            .insert(session_id.clone(), TrackedStatus::new(JobStatus::Queued));
        tracing::debug!(session_id = %session_id, "Job queued");

        let queued = QueuedJob { job, completion };
        if let Err(mpsc::error::SendError(rejected)) = self.sender.send(queued).await {
            let status = JobStatus::Failed {
                error: "ingest queue is closed".to_string(),
            };
            tracing::error!(session_id = %session_id, "Ingest queue closed; job dropped");
            self.statuses
                .insert(session_id.clone(), TrackedStatus::new(status.clone()));
            let _ = rejected.completion.send(status);
        }

        JobTicket {
            session_id,
            completion: receiver,
        }
    }

    /// Latest known status for `session_id`, if it has not expired.
    pub fn status(&self, session_id: &str) -> Option<JobStatus> {
        let removed = self
            .statuses
            .remove_if(session_id, |_, tracked| tracked.expired(self.retention));
        if removed.is_some() {
            return None;
        }
        self.statuses
            .get(session_id)
            .map(|entry| entry.status.clone())
    }

    /// Drop finished statuses older than the retention window, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        let before = self.statuses.len();
        self.statuses
            .retain(|_, tracked| !tracked.expired(self.retention));
        let evicted = before.saturating_sub(self.statuses.len());
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted finished job statuses");
        }
        evicted
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<QueuedJob>,
    processor: Arc<dyn ProcessingApi>,
    statuses: StatusMap,
) {
    while let Some(queued) = receiver.recv().await {
        tokio::spawn(run_job(queued, processor.clone(), statuses.clone()));
    }
    tracing::debug!("Ingest queue stopped");
}

async fn run_job(queued: QueuedJob, processor: Arc<dyn ProcessingApi>, statuses: StatusMap) {
    let QueuedJob { job, completion } = queued;
    let session_id = job.session_id.clone();
    statuses.insert(session_id.clone(), TrackedStatus::new(JobStatus::Processing));

    let status = match tokio::spawn(async move { processor.process(job).await }).await {
        Ok(Ok(outcome)) => JobStatus::Completed(outcome),
        Ok(Err(error)) => JobStatus::Failed {
            error: error.to_string(),
        },
        Err(join_error) => {
            tracing::error!(
                session_id = %session_id,
                error = %join_error,
                "Pipeline task panicked"
            );
            JobStatus::Failed {
                error: format!("pipeline task aborted: {join_error}"),
            }
        }
    };

    tracing::debug!(session_id = %session_id, status = ?status, "Job finished");
    statuses.insert(session_id, TrackedStatus::new(status.clone()));
    let _ = completion.send(status);
}
