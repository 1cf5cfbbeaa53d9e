//! Resolution job manager.
//!
//! Tracks cloud resolutions running in the background. Each job owns a
//! [`CancellationToken`] derived from the manager's root token, so cancelling
//! one job, reaping it, or shutting the manager down all reach the task doing
//! the work.
//!
//! Status transitions only move forward:
//!
//! ```text
//! searching -> downloading -> completed
//!     |             |      \-> error
//!     |             \--------> cancelled
//!     \--> completed | error | cancelled
//! ```

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reelhunt_common::{ContentKey, Error, ErrorKind, JobId, Result, SourceKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Status of a resolution job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Searching,
    Downloading,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Whether a job in this status may move to `next`. Staying in the same
    /// non-terminal status is allowed so progress can be reported.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            Self::Searching => true,
            Self::Downloading => next != Self::Searching,
            Self::Completed | Self::Error | Self::Cancelled => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Searching => "searching",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job is resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobContent {
    #[serde(flatten)]
    pub key: ContentKey,
    pub title: String,
    pub year: Option<u16>,
}

/// Successful outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub stream_url: String,
    pub file_name: String,
    pub source_kind: SourceKind,
}

/// Failure recorded on a job, surfaced verbatim to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: ErrorKind,
    pub message: String,
}

impl From<&Error> for JobError {
    fn from(err: &Error) -> Self {
        Self {
            code: err.kind(),
            message: err.to_string(),
        }
    }
}

/// A tracked resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionJob {
    pub job_id: JobId,
    pub content: JobContent,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub result: Option<JobResult>,
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
}

/// Job poll response: the job flattened for clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPoll {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_kind: Option<SourceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl From<ResolutionJob> for JobPoll {
    fn from(job: ResolutionJob) -> Self {
        let (stream_url, file_name, source_kind) = match job.result {
            Some(r) => (Some(r.stream_url), Some(r.file_name), Some(r.source_kind)),
            None => (None, None, None),
        };
        Self {
            job_id: job.job_id,
            status: job.status,
            progress: job.progress,
            message: job.message,
            stream_url,
            file_name,
            source_kind,
            error: job.error,
        }
    }
}

/// Partial update applied with [`JobManager::update`].
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub result: Option<JobResult>,
    pub error: Option<JobError>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn completed(result: JobResult) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100.0),
            message: Some("Source ready".into()),
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn failed(err: &Error) -> Self {
        Self {
            status: Some(JobStatus::Error),
            message: Some(err.to_string()),
            error: Some(JobError::from(err)),
            ..Default::default()
        }
    }
}

/// A freshly created job and the token its worker must observe.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub id: JobId,
    pub cancel: CancellationToken,
}

struct JobEntry {
    job: ResolutionJob,
    cancel: CancellationToken,
}

/// Concurrent job table with a periodic reaper.
#[derive(Clone)]
pub struct JobManager {
    jobs: Arc<DashMap<JobId, JobEntry>>,
    max_age: chrono::Duration,
    shutdown: CancellationToken,
}

impl JobManager {
    /// Create a manager that forgets jobs older than `max_age`.
    pub fn new(max_age: Duration) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            max_age: chrono::Duration::from_std(max_age)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register a new job in `searching`.
    pub fn create(&self, content: JobContent) -> JobTicket {
        let id = JobId::new();
        let cancel = self.shutdown.child_token();
        let job = ResolutionJob {
            job_id: id,
            content,
            status: JobStatus::Searching,
            progress: 0,
            message: "Searching for sources".into(),
            result: None,
            error: None,
            created_at: Utc::now(),
        };

        tracing::info!(job_id = %id, key = %job.content.key, "Created resolution job");
        self.jobs.insert(
            id,
            JobEntry {
                job,
                cancel: cancel.clone(),
            },
        );
        JobTicket { id, cancel }
    }

    /// Apply a partial update.
    ///
    /// Returns `false` without changing anything when the job is absent,
    /// already terminal, or the requested status would move backwards.
    /// Progress is clamped to 0..=100 and never decreases.
    pub fn update(&self, id: JobId, update: JobUpdate) -> bool {
        let Some(mut entry) = self.jobs.get_mut(&id) else {
            return false;
        };
        let job = &mut entry.job;

        if job.status.is_terminal() {
            tracing::debug!(job_id = %id, status = %job.status, "Ignoring update to terminal job");
            return false;
        }
        if let Some(next) = update.status {
            if !job.status.can_transition_to(next) {
                tracing::debug!(
                    job_id = %id,
                    from = %job.status,
                    to = %next,
                    "Ignoring backwards transition"
                );
                return false;
            }
            if next != job.status {
                tracing::info!(job_id = %id, from = %job.status, to = %next, "Job status changed");
            }
            job.status = next;
        }
        if let Some(progress) = update.progress {
            job.progress = job.progress.max(clamp_progress(progress));
        }
        if let Some(message) = update.message {
            job.message = message;
        }
        if update.result.is_some() {
            job.result = update.result;
        }
        if update.error.is_some() {
            job.error = update.error;
        }
        true
    }

    /// Snapshot of a job.
    pub fn get(&self, id: JobId) -> Result<ResolutionJob> {
        self.jobs
            .get(&id)
            .map(|entry| entry.job.clone())
            .ok_or_else(|| Error::job_not_found(id))
    }

    /// Cancel a non-terminal job and signal its worker.
    ///
    /// Returns whether anything changed. Cancelling an absent or finished job
    /// is not an error.
    pub fn cancel(&self, id: JobId) -> bool {
        let Some(mut entry) = self.jobs.get_mut(&id) else {
            return false;
        };
        if entry.job.status.is_terminal() {
            return false;
        }
        entry.job.status = JobStatus::Cancelled;
        entry.job.message = "Cancelled".into();
        entry.cancel.cancel();
        tracing::info!(job_id = %id, "Cancelled resolution job");
        true
    }

    /// Remove every job created before `now - max_age`.
    pub fn reap_at(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.jobs.retain(|id, entry| {
            let age = now - entry.job.created_at;
            if age > self.max_age {
                entry.cancel.cancel();
                tracing::debug!(
                    job_id = %id,
                    status = %entry.job.status,
                    age_secs = age.num_seconds(),
                    "Reaped job"
                );
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            tracing::info!(removed, "Reaped stale resolution jobs");
        }
        removed
    }

    pub fn reap(&self) -> usize {
        self.reap_at(Utc::now())
    }

    /// Start the periodic reaper. It stops when [`shutdown`](Self::shutdown)
    /// is called.
    pub fn start_reaper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = manager.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        manager.reap();
                    }
                }
            }
            tracing::debug!("Job reaper stopped");
        })
    }

    /// Stop the reaper and signal every in-flight job to stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

fn clamp_progress(progress: f64) -> u8 {
    if progress.is_nan() {
        return 0;
    }
    progress.clamp(0.0, 100.0).round() as u8
}
