//! In-memory job registry.
//!
//! [`JobStore`] owns every [`Job`] record. Each record sits behind its own
//! lock, so updates to one job never contend with reads or writes of another,
//! and a reader always sees a whole snapshot rather than a half-applied
//! update.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use hf_core::{Error, Job, JobId, JobStatus, Result, TargetFormat};

/// Concurrency-safe registry of batch jobs.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: DashMap<JobId, Arc<RwLock<Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh `processing` job and return its snapshot.
    pub fn create(&self, total: u32, format: TargetFormat) -> Job {
        let job = Job::new(total, format);
        let snapshot = job.clone();
        self.jobs.insert(job.id, Arc::new(RwLock::new(job)));
        snapshot
    }

    /// Current snapshot of a job.
    pub fn get(&self, id: JobId) -> Result<Job> {
        Ok(self.entry(id)?.read().clone())
    }

    pub fn increment_completed(&self, id: JobId) -> Result<()> {
        self.update(id, Job::record_success)
    }

    pub fn increment_failed(&self, id: JobId) -> Result<()> {
        self.update(id, Job::record_failure)
    }

    /// Terminal transition to `completed`. Rejected if the job is already terminal.
    pub fn mark_completed(&self, id: JobId, result_location: PathBuf) -> Result<()> {
        self.update(id, |job| job.complete(result_location))
    }

    /// Terminal transition to `failed`. Rejected if the job is already terminal.
    pub fn mark_failed(&self, id: JobId, detail: impl Into<String>) -> Result<()> {
        let detail = detail.into();
        self.update(id, |job| job.fail(detail))
    }

    /// Number of jobs still processing.
    pub fn active_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|entry| entry.value().read().status == JobStatus::Processing)
            .count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drop a job from the registry, returning its final snapshot.
    pub fn remove(&self, id: JobId) -> Option<Job> {
        let (_, job) = self.jobs.remove(&id)?;
        let snapshot = job.read().clone();
        Some(snapshot)
    }

    /// Terminal jobs that finished more than `ttl` before `now`.
    pub fn expired(&self, ttl: Duration, now: DateTime<Utc>) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter_map(|entry| {
                let job = entry.value().read();
                let deadline = job.finished_at?.checked_add_signed(ttl)?;
                (job.is_terminal() && deadline <= now).then_some(job.id)
            })
            .collect()
    }

    fn entry(&self, id: JobId) -> Result<Arc<RwLock<Job>>> {
        // Clone the Arc so the shard guard is released before locking the job.
        self.jobs
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::not_found("job", id))
    }

    fn update<T>(&self, id: JobId, f: impl FnOnce(&mut Job) -> Result<T>) -> Result<T> {
        let entry = self.entry(id)?;
        let mut job = entry.write();
        f(&mut job)
    }
}
