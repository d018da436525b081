//! Retention sweeper for finished jobs.
//!
//! Periodically drops terminal jobs older than the configured TTL from the
//! store and deletes their working directories.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// TTLs beyond a century are treated as "keep forever".
const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Run the sweeper until the cancellation token is triggered.
pub async fn run_sweeper(ctx: AppContext, cancel: CancellationToken) {
    let retention = ctx.config.retention.clone();
    if !retention.enabled || retention.sweep_interval_secs == 0 {
        tracing::info!("Job retention sweeper disabled");
        return;
    }

    tracing::info!(
        ttl_secs = retention.job_ttl_secs,
        interval_secs = retention.sweep_interval_secs,
        "Job retention sweeper started"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(retention.sweep_interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep_once(&ctx, Utc::now());
            }
            _ = cancel.cancelled() => break,
        }
    }

    tracing::info!("Job retention sweeper stopped");
}

/// Remove every job that expired as of `now`. Returns how many were removed.
pub fn sweep_once(ctx: &AppContext, now: DateTime<Utc>) -> usize {
    let ttl_secs = ctx.config.retention.job_ttl_secs.min(MAX_TTL_SECS) as i64;
    let ttl = chrono::Duration::seconds(ttl_secs);

    let expired = ctx.jobs.expired(ttl, now);
    for &id in &expired {
        if let Some(job) = ctx.jobs.remove(id) {
            tracing::info!(job_id = %id, status = %job.status, "Expired job removed");
        }
        if let Err(e) = ctx.storage.remove_job_dir(id) {
            tracing::warn!(job_id = %id, error = %e, "Failed to remove expired job directory");
        }
    }
    expired.len()
}
