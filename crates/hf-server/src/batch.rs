//! Batch job operations: submit, status, download.
//!
//! These sit between the HTTP handlers and the store/processor so the same
//! lifecycle can be driven without going through axum.

use std::path::PathBuf;

use bytes::Bytes;

use hf_core::{Error, Job, JobId, JobStatus, Result, TargetFormat};

use crate::batch_processor::{self, BatchInput, BatchRequest};
use crate::context::AppContext;

/// One file received from the client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

/// Parse and range-check a quality value, falling back to `default`.
pub fn parse_quality(raw: Option<&str>, default: u8) -> Result<u8> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(default);
    };
    match raw.parse::<u8>() {
        Ok(q) if (1..=100).contains(&q) => Ok(q),
        _ => Err(Error::Validation(format!(
            "quality must be an integer between 1 and 100 (got '{raw}')"
        ))),
    }
}

/// Parse a job identifier from a path segment. Malformed IDs are unknown IDs.
pub fn parse_job_id(raw: &str) -> Result<JobId> {
    raw.parse().map_err(|_| Error::not_found("job", raw))
}

/// Validate a batch, persist its files, and schedule processing.
///
/// Returns as soon as the inputs are on disk; conversion happens in a
/// background task whose outcome is only visible through [`get_status`].
pub async fn submit_batch(
    ctx: &AppContext,
    files: Vec<UploadedFile>,
    format: &str,
    quality: u8,
) -> Result<Job> {
    let max_files = ctx.config.batch.max_files;
    if files.is_empty() {
        return Err(Error::Validation("No files provided".into()));
    }
    if files.len() > max_files {
        return Err(Error::Validation(format!(
            "Maximum {max_files} files allowed per batch (got {})",
            files.len()
        )));
    }
    let target: TargetFormat = format.parse()?;
    if !(1..=100).contains(&quality) {
        return Err(Error::Validation(format!(
            "quality must be between 1 and 100 (got {quality})"
        )));
    }

    let total = u32::try_from(files.len())
        .map_err(|_| Error::Validation("too many files".into()))?;
    let job = ctx.jobs.create(total, target);
    let job_id = job.id;
    tracing::info!(job_id = %job_id, files = total, format = %target, quality, "Batch accepted");

    let inputs = match store_inputs(ctx, job_id, &files).await {
        Ok(inputs) => inputs,
        Err(e) => {
            batch_processor::abort_job(ctx, job_id, &format!("Failed to store uploads: {e}"));
            return Err(e);
        }
    };

    let request = BatchRequest {
        job_id,
        format: target,
        quality,
        inputs,
    };
    spawn_supervised(ctx.clone(), request);

    Ok(job)
}

/// Current snapshot of a job.
pub fn get_status(ctx: &AppContext, id: JobId) -> Result<Job> {
    ctx.jobs.get(id)
}

/// Location of a completed job's archive.
///
/// Fails with `NotReady` while the job has not completed and with
/// `ArchiveMissing` if the archive was removed from storage behind our back.
pub fn download(ctx: &AppContext, id: JobId) -> Result<PathBuf> {
    let job = ctx.jobs.get(id)?;
    if job.status != JobStatus::Completed {
        return Err(Error::not_ready(id, job.status));
    }
    match job.result_location {
        Some(path) if path.is_file() => Ok(path),
        _ => {
            tracing::error!(job_id = %id, "Completed job has no archive on disk");
            Err(Error::archive_missing(id))
        }
    }
}

async fn store_inputs(
    ctx: &AppContext,
    job_id: JobId,
    files: &[UploadedFile],
) -> Result<Vec<BatchInput>> {
    ctx.storage.create_job_dir(job_id)?;
    let mut inputs = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        let path = ctx
            .storage
            .write_input(job_id, index, &file.file_name, &file.data)
            .await?;
        inputs.push(BatchInput {
            index,
            file_name: file.file_name.clone(),
            path,
        });
    }
    Ok(inputs)
}

/// Run the batch in the background, failing the job if the task dies.
fn spawn_supervised(ctx: AppContext, request: BatchRequest) {
    let job_id = request.job_id;
    let worker = tokio::spawn(batch_processor::run_batch(ctx.clone(), request));

    tokio::spawn(async move {
        if let Err(e) = worker.await {
            batch_processor::abort_job(&ctx, job_id, &format!("Batch task crashed: {e}"));
        }
    });
}
