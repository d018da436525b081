//! Batch job status and download handlers.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::Extension;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use hf_core::{Error, Job, JobStatus};

use crate::batch::{self, parse_job_id};
use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::request_id::RequestId;

/// Job status response.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub start_time: String,
    pub finished_at: Option<String>,
    /// File name of the archive once the job completed.
    pub result_file: Option<String>,
    pub error: Option<String>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status,
            total: job.total,
            completed: job.completed,
            failed: job.failed,
            start_time: job.start_time.to_rfc3339(),
            finished_at: job.finished_at.map(|t| t.to_rfc3339()),
            result_file: job
                .result_location
                .as_deref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned()),
            error: job.error,
        }
    }
}

/// GET /status/{id}
#[utoipa::path(
    get,
    path = "/status/{id}",
    params(("id" = String, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Job snapshot", body = JobStatusResponse),
        (status = 404, description = "Unknown job")
    )
)]
pub async fn get_status(
    State(ctx): State<AppContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(id): Path<String>,
) -> Result<Json<JobStatusResponse>, AppError> {
    parse_job_id(&id)
        .and_then(|id| batch::get_status(&ctx, id))
        .map(|job| Json(job.into()))
        .map_err(|e| AppError::from(e).with_request_id(request_id))
}

/// GET /download/{id}
#[utoipa::path(
    get,
    path = "/download/{id}",
    params(("id" = String, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Zip archive of converted files"),
        (status = 400, description = "Job has not completed"),
        (status = 404, description = "Unknown job or archive missing")
    )
)]
pub async fn download(
    State(ctx): State<AppContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    stream_archive(&ctx, &id)
        .await
        .map_err(|e| AppError::from(e).with_request_id(request_id))
}

async fn stream_archive(ctx: &AppContext, id: &str) -> Result<Response, Error> {
    let id = parse_job_id(id)?;
    let path = batch::download(ctx, id)?;

    // The sweeper may remove the archive between the check and the open.
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::archive_missing(id))
        }
        Err(e) => return Err(e.into()),
    };
    let length = file.metadata().await?.len();

    tracing::info!(job_id = %id, bytes = length, "Serving archive");

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"converted_files_{id}.zip\""),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}
