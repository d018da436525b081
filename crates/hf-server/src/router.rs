//! Axum router construction.
//!
//! Builds the full application router with all routes, middleware layers,
//! the OpenAPI document, and optional static file serving.

use std::path::PathBuf;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::convert::convert_single,
        routes::convert::convert_batch,
        routes::jobs::get_status,
        routes::jobs::download,
        routes::health::health_check,
        routes::health::banner,
    ),
    components(schemas(
        routes::convert::SingleUpload,
        routes::convert::BatchUpload,
        routes::convert::BatchAccepted,
        routes::jobs::JobStatusResponse,
        routes::health::HealthResponse,
        routes::health::BannerResponse,
        hf_core::JobStatus,
        hf_core::TargetFormat,
    )),
    info(title = "heicforge", description = "HEIC/HEIF conversion service")
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext, static_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = DefaultBodyLimit::max(ctx.config.batch.max_upload_bytes);

    let mut app = Router::new()
        .route("/convert/single", post(routes::convert::convert_single))
        .route("/convert/batch", post(routes::convert::convert_batch))
        .route("/status/{id}", get(routes::jobs::get_status))
        .route("/download/{id}", get(routes::jobs::download))
        .route("/health", get(routes::health::health_check))
        .route("/api", get(routes::health::banner))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(body_limit)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    // Static file serving for a front-end build.
    if let Some(dir) = static_dir {
        if dir.exists() {
            tracing::info!("Serving static files from {:?}", dir);
            let index_path = dir.join("index.html");
            app = app.fallback_service(
                tower_http::services::ServeDir::new(&dir)
                    .append_index_html_on_directories(true)
                    .not_found_service(tower_http::services::ServeFile::new(index_path)),
            );
        } else {
            tracing::warn!("Static directory {:?} does not exist; not serving it", dir);
        }
    }

    app
}
