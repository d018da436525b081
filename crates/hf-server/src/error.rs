//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`hf_core::Error`] so that route handlers
//! can return `Result<T, AppError>` and use `?` on core results.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: hf_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: hf_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn inner(&self) -> &hf_core::Error {
        &self.inner
    }
}

impl From<hf_core::Error> for AppError {
    fn from(e: hf_core::Error) -> Self {
        Self::new(e)
    }
}

impl From<hf_convert::ConvertError> for AppError {
    fn from(e: hf_convert::ConvertError) -> Self {
        Self::new(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
        }

        let body = json!({
            "error": self.inner.to_string(),
            "code": self.inner.code(),
            "request_id": self.request_id,
        });

        (status, axum::Json(body)).into_response()
    }
}
