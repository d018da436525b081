//! Liveness and service banner.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    /// Entries currently in working storage.
    pub temp_files: usize,
    /// Jobs still processing.
    pub active_jobs: usize,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BannerResponse {
    pub message: String,
    pub version: String,
}

/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_check(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        temp_files: ctx.storage.entry_count(),
        active_jobs: ctx.jobs.active_count(),
    })
}

/// GET /api
#[utoipa::path(
    get,
    path = "/api",
    responses((status = 200, description = "Service banner", body = BannerResponse))
)]
pub async fn banner() -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "HEIC converter API".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}
