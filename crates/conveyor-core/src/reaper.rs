//! Heartbeat-timeout recovery.
//!
//! Workers prove liveness through periodic heartbeats. A worker that stops
//! heartbeating while a task is RUNNING would strand that task forever, so
//! the reaper periodically re-PENDs every RUNNING task whose worker is
//! missing or has gone quiet past the timeout, and flips those workers to
//! `inactive`. Requeued tasks re-enter the ready set and are dispatched
//! again -- this is the at-least-once window of the delivery contract.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use conveyor_db::models::Task;
use conveyor_db::queries::{tasks, workers};

use crate::error::Result;

/// Tunables for the reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// How long a worker may go without a heartbeat before its RUNNING
    /// tasks are recovered. Three missed 30s heartbeats by default.
    pub heartbeat_timeout: Duration,
}

impl ReaperConfig {
    pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(90);

    /// Build a config from the environment (`CONVEYOR_REAPER_TIMEOUT_SECS`).
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("CONVEYOR_REAPER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(Self::DEFAULT_HEARTBEAT_TIMEOUT.as_secs());
        Self {
            heartbeat_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Self::DEFAULT_HEARTBEAT_TIMEOUT,
        }
    }
}

/// One recovery pass: requeue abandoned tasks, then sweep their workers.
///
/// The two statements are not wrapped in a transaction; both are
/// idempotent and predicated on the same cutoff, so a crash between them
/// only delays the worker sweep to the next pass.
pub async fn sweep(pool: &PgPool, config: &ReaperConfig) -> Result<Vec<Task>> {
    let cutoff = Utc::now() - chrono::Duration::seconds(config.heartbeat_timeout.as_secs() as i64);

    let requeued = tasks::requeue_abandoned_tasks(pool, cutoff).await?;
    let swept = workers::mark_stale_workers_inactive(pool, cutoff).await?;

    if !requeued.is_empty() || !swept.is_empty() {
        tracing::info!(
            requeued_tasks = requeued.len(),
            swept_workers = swept.len(),
            "reaper recovered abandoned work"
        );
    }

    Ok(requeued)
}

/// Run recovery passes until the shutdown token is cancelled.
///
/// The pass interval equals the heartbeat timeout; finer granularity buys
/// nothing because a worker is only considered dead after the timeout.
pub async fn run(pool: PgPool, config: ReaperConfig, shutdown: CancellationToken) {
    let interval = config.heartbeat_timeout;
    tracing::info!(timeout = ?config.heartbeat_timeout, "reaper started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        if let Err(e) = sweep(&pool, &config).await {
            tracing::warn!(error = %e, "reaper sweep failed, will retry");
        }
    }

    tracing::info!("reaper shut down");
}
