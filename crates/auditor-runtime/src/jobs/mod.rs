//! Audit jobs: records, status events and the runner that executes them.
//!
//! The pipeline itself knows nothing about jobs. [`JobRunner`] wraps a
//! [`PipelineController`](crate::PipelineController) run in a job whose
//! progress is written to an injected [`JobStore`] and broadcast to
//! subscribers as [`JobEvent`]s.

mod runner;
mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use auditor_core::{AuditResult, Stage};

use crate::resilience::LlmUsage;

pub use runner::{JobRunner, EMPTY_DOCUMENT_MESSAGE};
pub use store::{InMemoryJobStore, JobStore};

/// Errors from the job layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("Job already finished: {0}")]
    AlreadyFinished(JobId),

    #[error("Job still running: {0}")]
    StillRunning(JobId),
}

/// Opaque job identifier (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Current state of one job, as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,

    /// 0..=100, never decreases
    pub progress: u8,

    pub message: String,

    /// Set once the job completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AuditResult>,

    /// Set once the job fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<LlmUsage>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// A freshly queued job.
    pub fn queued(id: JobId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0,
            message: "Initializing...".to_string(),
            result: None,
            error: None,
            usage: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an update. Progress only ever moves forward.
    pub(crate) fn apply(&mut self, update: JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = self.progress.max(progress.min(100));
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if update.result.is_some() {
            self.result = update.result;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        if update.usage.is_some() {
            self.usage = update.usage;
        }
        self.updated_at = Utc::now();
    }
}

/// A partial change to a [`JobRecord`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,

    /// Stage whose completion this update reports
    pub stage: Option<Stage>,

    pub result: Option<AuditResult>,
    pub error: Option<String>,
    pub usage: Option<LlmUsage>,
}

impl JobUpdate {
    /// Job picked up by a worker.
    pub fn started(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            progress: Some(10),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// A pipeline stage finished.
    pub fn stage(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            progress: Some(stage.progress_percent()),
            message: Some(message.into()),
            stage: Some(stage),
            ..Default::default()
        }
    }

    pub fn completed(result: AuditResult, usage: LlmUsage) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            message: Some("Audit Complete!".to_string()),
            stage: Some(Stage::Done),
            result: Some(result),
            usage: Some(usage),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            status: Some(JobStatus::Failed),
            message: Some(error.clone()),
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Broadcast to subscribers of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// Progress moved or the message changed
    Progress {
        job_id: JobId,
        /// Name of the completed stage, when the update came from one
        #[serde(skip_serializing_if = "Option::is_none")]
        stage_name: Option<String>,
        progress_percent: u8,
        message: String,
    },

    /// The job reached COMPLETED or FAILED; no events follow
    Finished {
        job_id: JobId,
        status: JobStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<AuditResult>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
}

impl JobEvent {
    pub(crate) fn from_record(record: &JobRecord, stage: Option<Stage>) -> Self {
        if record.status.is_terminal() {
            JobEvent::Finished {
                job_id: record.id.clone(),
                status: record.status,
                result: record.result.clone(),
                error_message: record.error.clone(),
            }
        } else {
            JobEvent::Progress {
                job_id: record.id.clone(),
                stage_name: stage.map(|s| s.name().to_string()),
                progress_percent: record.progress,
                message: record.message.clone(),
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Finished { .. })
    }
}

/// Status message shown when `stage` completes.
///
/// `loop_count` is the number of critic passes so far; an audit after a
/// critique is a re-audit.
pub fn stage_message(stage: Stage, loop_count: u32) -> String {
    match stage {
        Stage::Extracting => "Agent 1: Clause Context Extracted".to_string(),
        Stage::Auditing if loop_count > 0 => {
            format!("Agent 2: Re-Auditing (Loop {})...", loop_count + 1)
        }
        Stage::Auditing => "Agent 2: Audit vs Risk Standards Complete".to_string(),
        Stage::Critiquing => "Agent 3: Critic Quality Check Complete".to_string(),
        Stage::Reporting => "Finalizing Multimodal Report...".to_string(),
        Stage::Done => "Audit Complete!".to_string(),
    }
}
