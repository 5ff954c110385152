//! Core job types and the analysis job state machine.
//!
//! ```text
//! pending --start--> processing --succeed--> completed
//!    |                   |
//!    +------fail---------+------fail-------> failed
//! ```
//!
//! Transitions are methods on [`Job`]; every store applies them the same way.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use partnerlens_ai::AnalysisOutcome;
use partnerlens_core::{JobId, ScenarioId, UserId};

/// Progress values recorded as the pipeline crosses each stage.
pub mod checkpoint {
    /// Scenario resolved, processing started.
    pub const STARTED: u8 = 10;
    /// Analysis engine invoked.
    pub const ENGINE_INVOKED: u8 = 30;
    /// Result ready, being persisted.
    pub const RESULT_READY: u8 = 80;
    pub const DONE: u8 = 100;
}

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting for a worker.
    Pending,
    /// A worker owns it.
    Processing,
    /// Finished with a result.
    Completed,
    /// Finished without a result.
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Rejected state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job {job_id} is already {status}")]
    Terminal { job_id: JobId, status: JobStatus },

    #[error("job {job_id} cannot move from {from} to {to}")]
    Illegal {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job {job_id} progress cannot go from {current} to {requested}")]
    ProgressRegression {
        job_id: JobId,
        current: u8,
        requested: u8,
    },
}

/// One analysis run of one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub scenario_id: ScenarioId,
    pub owner_id: UserId,
    pub status: JobStatus,
    /// 0..=100, never decreases.
    pub progress: u8,
    /// Present only when `failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set on entering `processing`.
    pub started_at: Option<DateTime<Utc>>,
    /// Set on entering a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job.
    pub fn new(scenario_id: ScenarioId, owner_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            scenario_id,
            owner_id,
            status: JobStatus::Pending,
            progress: 0,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    fn ensure_not_terminal(&self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal {
                job_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    fn ensure_progress(&self, requested: u8) -> Result<(), TransitionError> {
        if requested < self.progress || requested > checkpoint::DONE {
            return Err(TransitionError::ProgressRegression {
                job_id: self.id,
                current: self.progress,
                requested,
            });
        }
        Ok(())
    }

    /// `pending -> processing`.
    pub fn mark_processing(&mut self, progress: u8, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.ensure_not_terminal()?;
        if self.status != JobStatus::Pending {
            return Err(TransitionError::Illegal {
                job_id: self.id,
                from: self.status,
                to: JobStatus::Processing,
            });
        }
        self.ensure_progress(progress)?;
        self.status = JobStatus::Processing;
        self.progress = progress;
        self.started_at = Some(now);
        Ok(())
    }

    /// Record a checkpoint while `processing`. Idempotent for the current value.
    pub fn advance(&mut self, progress: u8) -> Result<(), TransitionError> {
        self.ensure_not_terminal()?;
        if self.status != JobStatus::Processing {
            return Err(TransitionError::Illegal {
                job_id: self.id,
                from: self.status,
                to: JobStatus::Processing,
            });
        }
        if progress >= checkpoint::DONE {
            return Err(TransitionError::ProgressRegression {
                job_id: self.id,
                current: self.progress,
                requested: progress,
            });
        }
        self.ensure_progress(progress)?;
        self.progress = progress;
        Ok(())
    }

    /// `processing -> completed`.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.ensure_not_terminal()?;
        if self.status != JobStatus::Processing {
            return Err(TransitionError::Illegal {
                job_id: self.id,
                from: self.status,
                to: JobStatus::Completed,
            });
        }
        self.status = JobStatus::Completed;
        self.progress = checkpoint::DONE;
        self.error = None;
        self.completed_at = Some(now);
        Ok(())
    }

    /// `pending | processing -> failed`. Progress stays at its last checkpoint.
    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.ensure_not_terminal()?;
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(now);
        Ok(())
    }
}

/// The persisted result of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub job_id: JobId,
    pub scenario_id: ScenarioId,
    pub outcome: AnalysisOutcome,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time view of a job, with its result once completed.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatusView {
    pub job: Job,
    pub analysis: Option<StoredAnalysis>,
}

/// What `create_unless_active` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(Job),
    /// A non-terminal job already exists for the scenario.
    AlreadyActive(Job),
}
