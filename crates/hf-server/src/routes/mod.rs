//! Route handlers for the HTTP API.

pub mod convert;
pub mod health;
pub mod jobs;

use axum::extract::Multipart;
use hf_core::Error;

use crate::batch::UploadedFile;

/// Contents of a conversion upload: files plus optional text options.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<UploadedFile>,
    pub format: Option<String>,
    pub quality: Option<String>,
}

/// Drain a multipart body. Any part with a filename is a file; `format` and
/// `quality` text parts are options; other parts are ignored.
pub async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, Error> {
    let bad_body = |e: axum::extract::multipart::MultipartError| {
        Error::Validation(format!("invalid multipart body: {e}"))
    };

    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_body)? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let data = field.bytes().await.map_err(bad_body)?;
            form.files.push(UploadedFile { file_name, data });
            continue;
        }

        match name.as_str() {
            "format" => form.format = Some(field.text().await.map_err(bad_body)?),
            "quality" => form.quality = Some(field.text().await.map_err(bad_body)?),
            other => tracing::debug!(field = %other, "Ignoring multipart field"),
        }
    }
    Ok(form)
}
