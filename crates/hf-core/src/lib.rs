//! hf-core: shared types, IDs, errors, configuration, and the job record.
//!
//! This crate is the foundational dependency for the other hf-* crates,
//! providing the typed job identifier, the unified error type, image format
//! enums, application configuration, and the batch job state machine.

pub mod config;
pub mod error;
pub mod format;
pub mod ids;
pub mod job;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use format::{SourceFormat, TargetFormat};
pub use ids::*;
pub use job::{Job, JobStatus};
