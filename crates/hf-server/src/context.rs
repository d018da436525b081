//! Application context shared by handlers and background tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use hf_convert::Converter;
use hf_core::config::Config;

use crate::storage::TempStorage;
use crate::store::JobStore;

/// Application context shared by all request handlers (via Axum state).
///
/// This is cheaply cloneable because it only holds `Arc`s.
#[derive(Clone)]
pub struct AppContext {
    /// Immutable application configuration snapshot.
    pub config: Arc<Config>,
    /// Registry of batch jobs.
    pub jobs: Arc<JobStore>,
    /// Per-job working directories.
    pub storage: Arc<TempStorage>,
    /// Image decode/encode capability.
    pub converter: Arc<dyn Converter>,
    /// Caps conversions running on the blocking pool.
    pub conversion_slots: Arc<Semaphore>,
}

impl AppContext {
    pub fn new(config: Config, storage: TempStorage, converter: Arc<dyn Converter>) -> Self {
        let slots = config.batch.max_concurrent_conversions.max(1);
        Self {
            conversion_slots: Arc::new(Semaphore::new(slots)),
            config: Arc::new(config),
            jobs: Arc::new(JobStore::new()),
            storage: Arc::new(storage),
            converter,
        }
    }

    /// Upper bound on a single file conversion.
    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.config.batch.file_timeout_secs.max(1))
    }
}
