//! `conveyor worker`: run a worker process until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use conveyor_core::worker::{TaskHandler, WorkerConfig, WorkerRuntime};
use conveyor_db::models::Task;

/// Stand-in payload executor.
///
/// Sleeps briefly to simulate work and reports success. A payload carrying
/// a `"fail"` key is failed with that value as the error message, which
/// makes the FAILED path exercisable end to end.
struct SimulatedHandler;

#[async_trait]
impl TaskHandler for SimulatedHandler {
    async fn execute(&self, task: &Task) -> Result<serde_json::Value> {
        if let Some(reason) = task.payload.get("fail").and_then(|v| v.as_str()) {
            anyhow::bail!("{reason}");
        }

        tokio::time::sleep(Duration::from_secs(2)).await;

        Ok(serde_json::json!({
            "status": "success",
            "processed_at": Utc::now().to_rfc3339(),
        }))
    }
}

/// Run the worker loop, draining gracefully on SIGINT/SIGTERM.
pub async fn run_worker(
    pool: PgPool,
    poll_interval: Option<u64>,
    name: Option<String>,
) -> Result<()> {
    let mut config = WorkerConfig::from_env();
    if let Some(secs) = poll_interval {
        config.poll_interval = Duration::from_secs(secs);
    }
    if let Some(name) = name {
        config.name = name;
    }

    let runtime = WorkerRuntime::new(pool, config, Arc::new(SimulatedHandler));

    let token = runtime.shutdown_token();
    tokio::spawn(async move {
        shutdown_requested().await;
        tracing::info!("shutdown signal received, draining");
        token.cancel();
    });

    runtime.run().await?;
    Ok(())
}

/// Resolve when SIGINT or SIGTERM arrives.
async fn shutdown_requested() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
