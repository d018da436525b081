//! Unified error type for the heicforge application.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for API handlers to derive an HTTP status code via [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes in heicforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested output format is not one we can encode.
    #[error("Unsupported format: {0} (supported: jpeg, png, bmp, webp)")]
    UnsupportedFormat(String),

    /// The job exists but has not completed yet.
    #[error("Job {id} is not ready for download (status: {status})")]
    NotReady {
        /// The job that was asked for.
        id: String,
        /// Its current status.
        status: String,
    },

    /// The job completed but its archive is gone from working storage.
    #[error("Archive for job {id} is missing from storage")]
    ArchiveMissing {
        /// The job whose archive vanished.
        id: String,
    },

    /// A state transition that the job's current state does not allow.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Input bytes could not be decoded as a supported image.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The encoder failed to produce output.
    #[error("Encode error: {0}")]
    Encode(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            Error::UnsupportedFormat(_) => 400,
            Error::NotReady { .. } => 400,
            Error::ArchiveMissing { .. } => 404,
            Error::Conflict(_) => 409,
            Error::Decode(_) => 500,
            Error::Encode(_) => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Validation(_) => "validation_error",
            Error::UnsupportedFormat(_) => "unsupported_format",
            Error::NotReady { .. } => "not_ready",
            Error::ArchiveMissing { .. } => "archive_missing",
            Error::Conflict(_) => "conflict",
            Error::Decode(_) => "decode_error",
            Error::Encode(_) => "encode_error",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::NotReady`].
    pub fn not_ready(id: impl fmt::Display, status: impl fmt::Display) -> Self {
        Error::NotReady {
            id: id.to_string(),
            status: status.to_string(),
        }
    }

    /// Convenience constructor for [`Error::ArchiveMissing`].
    pub fn archive_missing(id: impl fmt::Display) -> Self {
        Error::ArchiveMissing { id: id.to_string() }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
