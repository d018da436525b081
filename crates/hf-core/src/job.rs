//! The batch job record and its state machine.
//!
//! A [`Job`] starts in [`JobStatus::Processing`] and moves exactly once to
//! either [`JobStatus::Completed`] or [`JobStatus::Failed`]. All mutators
//! return [`Error::Conflict`] instead of breaking an invariant:
//!
//! - `completed + failed <= total` while processing
//! - `completed + failed == total` once terminal
//! - `result_location` is set iff the job is completed
//! - terminal jobs never change again

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::{Error, JobId, Result, TargetFormat};

/// Lifecycle state of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One batch conversion request's tracked lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub format: TargetFormat,
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub start_time: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result_location: Option<PathBuf>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(total: u32, format: TargetFormat) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Processing,
            format,
            total,
            completed: 0,
            failed: 0,
            start_time: Utc::now(),
            finished_at: None,
            result_location: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Files accounted for so far, successful or not.
    pub fn processed(&self) -> u32 {
        self.completed + self.failed
    }

    /// Count one successfully converted file.
    pub fn record_success(&mut self) -> Result<()> {
        self.ensure_countable()?;
        self.completed += 1;
        Ok(())
    }

    /// Count one file that failed to convert.
    pub fn record_failure(&mut self) -> Result<()> {
        self.ensure_countable()?;
        self.failed += 1;
        Ok(())
    }

    /// Transition to [`JobStatus::Completed`] with the archive location.
    pub fn complete(&mut self, result_location: PathBuf) -> Result<()> {
        self.ensure_processing()?;
        if self.completed == 0 {
            return Err(Error::Conflict(format!(
                "job {} cannot complete without any converted file",
                self.id
            )));
        }
        if self.processed() != self.total {
            return Err(Error::Conflict(format!(
                "job {} cannot complete with {} of {} files accounted for",
                self.id,
                self.processed(),
                self.total
            )));
        }
        self.status = JobStatus::Completed;
        self.result_location = Some(result_location);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Transition to [`JobStatus::Failed`] with a diagnostic.
    ///
    /// Files that were never reached count as failed, so the terminal
    /// accounting invariant holds even when processing stops early.
    pub fn fail(&mut self, detail: impl Into<String>) -> Result<()> {
        self.ensure_processing()?;
        self.failed = self.total - self.completed;
        self.status = JobStatus::Failed;
        self.error = Some(detail.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn ensure_processing(&self) -> Result<()> {
        if self.is_terminal() {
            return Err(Error::Conflict(format!(
                "job {} is already {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    fn ensure_countable(&self) -> Result<()> {
        self.ensure_processing()?;
        if self.processed() >= self.total {
            return Err(Error::Conflict(format!(
                "job {} already accounted for all {} files",
                self.id, self.total
            )));
        }
        Ok(())
    }
}
