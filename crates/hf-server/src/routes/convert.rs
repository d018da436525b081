//! Conversion upload handlers: single file (synchronous) and batch (job).

use axum::extract::{Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use hf_core::format::{ensure_source_extension, file_stem};
use hf_core::{Error, TargetFormat};

use crate::batch::{self, parse_quality};
use crate::batch_processor::convert_in_pool;
use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::request_id::RequestId;
use crate::routes::{read_upload_form, UploadForm};
use crate::storage::sanitize_file_name;

/// Conversion options accepted on the query string.
///
/// The same names sent as multipart text fields take precedence.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConvertParams {
    /// Target format: jpeg, png, bmp, or webp.
    pub format: Option<String>,
    /// Encoder quality, 1-100.
    pub quality: Option<String>,
}

/// Multipart body for `POST /convert/single`.
#[derive(Debug, utoipa::ToSchema)]
#[allow(dead_code)]
pub struct SingleUpload {
    /// The HEIC/HEIF image.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    pub format: Option<String>,
    pub quality: Option<u8>,
}

/// Multipart body for `POST /convert/batch`.
#[derive(Debug, utoipa::ToSchema)]
#[allow(dead_code)]
pub struct BatchUpload {
    /// One or more images; repeat the part for each file.
    #[schema(value_type = Vec<String>)]
    pub files: Vec<Vec<u8>>,
    pub format: Option<String>,
    pub quality: Option<u8>,
}

/// Response body for an accepted batch.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BatchAccepted {
    pub job_id: String,
    pub message: String,
}

/// Resolved format and quality for one request.
fn resolve_options(
    ctx: &AppContext,
    params: ConvertParams,
    form: &mut UploadForm,
) -> Result<(String, u8), Error> {
    let format = form
        .format
        .take()
        .or(params.format)
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| ctx.config.batch.default_format.clone());
    let quality = form.quality.take().or(params.quality);
    let quality = parse_quality(quality.as_deref(), ctx.config.batch.default_quality)?;
    Ok((format, quality))
}

/// POST /convert/single
#[utoipa::path(
    post,
    path = "/convert/single",
    params(ConvertParams),
    request_body(content = SingleUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Converted image bytes"),
        (status = 400, description = "Bad extension, format, or quality"),
        (status = 500, description = "Conversion failed")
    )
)]
pub async fn convert_single(
    State(ctx): State<AppContext>,
    Query(params): Query<ConvertParams>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    single(&ctx, params, multipart)
        .await
        .map_err(|e| AppError::from(e).with_request_id(request_id))
}

async fn single(
    ctx: &AppContext,
    params: ConvertParams,
    multipart: Multipart,
) -> Result<Response, Error> {
    let mut form = read_upload_form(multipart).await?;
    let (format, quality) = resolve_options(ctx, params, &mut form)?;

    let mut files = form.files.into_iter();
    let file = match (files.next(), files.next()) {
        (Some(file), None) => file,
        (None, _) => return Err(Error::Validation("No file provided".into())),
        (Some(_), Some(_)) => {
            return Err(Error::Validation(
                "Exactly one file is expected; use /convert/batch for several".into(),
            ))
        }
    };

    let source = ensure_source_extension(&file.file_name)?;
    let target: TargetFormat = format.parse()?;

    let output = convert_in_pool(
        ctx,
        file.data.to_vec(),
        Some(source),
        target,
        quality,
        ctx.file_timeout(),
    )
    .await?;

    tracing::info!(
        file = %file.file_name,
        format = %target,
        bytes = output.len(),
        "Converted single file"
    );

    let download_name = format!(
        "{}.{}",
        sanitize_file_name(&file_stem(&file.file_name)),
        target.extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, target.mime_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{download_name}\""),
            ),
        ],
        output,
    )
        .into_response())
}

/// POST /convert/batch
#[utoipa::path(
    post,
    path = "/convert/batch",
    params(ConvertParams),
    request_body(content = BatchUpload, content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Batch accepted", body = BatchAccepted),
        (status = 400, description = "Too many files, bad format, or bad quality")
    )
)]
pub async fn convert_batch(
    State(ctx): State<AppContext>,
    Query(params): Query<ConvertParams>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<BatchAccepted>), AppError> {
    submit(&ctx, params, multipart)
        .await
        .map_err(|e| AppError::from(e).with_request_id(request_id))
}

async fn submit(
    ctx: &AppContext,
    params: ConvertParams,
    multipart: Multipart,
) -> Result<(StatusCode, Json<BatchAccepted>), Error> {
    let mut form = read_upload_form(multipart).await?;
    let (format, quality) = resolve_options(ctx, params, &mut form)?;

    let count = form.files.len();
    let job = batch::submit_batch(ctx, form.files, &format, quality).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchAccepted {
            job_id: job.id.to_string(),
            message: format!("Processing {count} files"),
        }),
    ))
}
