//! hf-server: HTTP API, batch job lifecycle, and background workers.
//!
//! This crate ties hf-core and hf-convert into a running service. It provides:
//!
//! - The in-memory [`store::JobStore`] and per-job [`storage::TempStorage`]
//! - The background [`batch_processor`] and the [`batch`] submit/status/download operations
//! - A retention [`sweeper`] for finished jobs
//! - The Axum router with request IDs, CORS, tracing, and an OpenAPI document
//! - Graceful shutdown via signal handling

pub mod batch;
pub mod batch_processor;
pub mod context;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod storage;
pub mod store;
pub mod sweeper;

use std::net::SocketAddr;
use std::sync::Arc;

use hf_convert::ImageConverter;
use hf_core::config::Config;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;
use crate::storage::TempStorage;

/// Build the application context from configuration.
///
/// Opens working storage and, if configured, clears what a previous process
/// left behind.
pub fn build_context(config: Config) -> hf_core::Result<AppContext> {
    let storage = TempStorage::new(&config.storage.temp_dir)?;
    if config.storage.purge_on_start {
        let removed = storage.purge()?;
        if removed > 0 {
            tracing::info!(
                "Purged {removed} stale entries from {}",
                storage.root().display()
            );
        }
    }

    if !ImageConverter::heif_enabled() {
        tracing::warn!("Built without the `heif` feature; HEIC/HEIF inputs will fail to decode");
    }

    Ok(AppContext::new(config, storage, Arc::new(ImageConverter::new())))
}

/// Start the heicforge server.
///
/// Constructs the [`AppContext`], spawns the retention sweeper, and serves
/// HTTP until a shutdown signal is received.
pub async fn start(config: Config) -> hf_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| hf_core::Error::Internal(format!("Invalid server address: {e}")))?;
    let static_dir = config.server.static_dir.clone();

    let ctx = build_context(config)?;
    tracing::info!(
        temp_dir = %ctx.storage.root().display(),
        max_files = ctx.config.batch.max_files,
        "Storage ready"
    );

    let cancel = CancellationToken::new();

    let sweeper_ctx = ctx.clone();
    let sweeper_cancel = cancel.clone();
    let sweeper_handle = tokio::spawn(async move {
        sweeper::run_sweeper(sweeper_ctx, sweeper_cancel).await;
    });

    let app = router::build_router(ctx, static_dir);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| hf_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Starting server on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .map_err(|e| hf_core::Error::Internal(format!("Server error: {e}")))?;

    // Signal background tasks to stop.
    cancel.cancel();
    let _ = sweeper_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use hf_convert::{ConvertError, Converter};
    use hf_core::config::Config;
    use hf_core::{Job, JobId, SourceFormat, TargetFormat};

    use crate::context::AppContext;
    use crate::storage::TempStorage;

    /// Converter that echoes its input as `<format>:<input>`, with a few
    /// magic inputs that fail, stall, or panic.
    #[derive(Debug, Clone, Copy)]
    pub struct MockConverter;

    impl MockConverter {
        pub const CORRUPT: &'static [u8] = b"CORRUPT";
        pub const SLOW: &'static [u8] = b"SLOW";
        pub const PANIC: &'static [u8] = b"PANIC";
    }

    impl Converter for MockConverter {
        fn convert(
            &self,
            input: &[u8],
            _source_hint: Option<SourceFormat>,
            target: TargetFormat,
            _quality: u8,
        ) -> Result<Vec<u8>, ConvertError> {
            match input {
                Self::CORRUPT => Err(ConvertError::Decode("corrupt input".into())),
                Self::SLOW => {
                    std::thread::sleep(Duration::from_millis(500));
                    Ok(input.to_vec())
                }
                Self::PANIC => panic!("decoder crashed"),
                _ => {
                    let mut out = format!("{target}:").into_bytes();
                    out.extend_from_slice(input);
                    Ok(out)
                }
            }
        }
    }

    pub fn test_context(converter: impl Converter + 'static) -> (AppContext, tempfile::TempDir) {
        test_context_with(converter, |_| {})
    }

    pub fn test_context_with(
        converter: impl Converter + 'static,
        configure: impl FnOnce(&mut Config),
    ) -> (AppContext, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.temp_dir = tmp.path().join("work");
        configure(&mut config);
        let storage = TempStorage::new(&config.storage.temp_dir).unwrap();
        (AppContext::new(config, storage, Arc::new(converter)), tmp)
    }

    /// Poll until the job leaves `processing`.
    pub async fn wait_terminal(ctx: &AppContext, id: JobId) -> Job {
        for _ in 0..500 {
            let job = ctx.jobs.get(id).unwrap();
            if job.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not finish in time");
    }
}
