//! The worker runtime loop: register, heartbeat, claim, execute, report.
//!
//! One task is in flight at a time; parallelism comes from running more
//! workers. All contention is resolved by the store's row locks during the
//! claim, so the loop itself holds no shared state beyond the shutdown
//! token.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use conveyor_db::models::Task;

use crate::error::{QueueError, Result};
use crate::queue::{claim, lifecycle};

use super::handler::TaskHandler;

/// Tunables for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Registered worker name, conventionally `worker-<host>-<pid>`.
    pub name: String,
    /// Sleep between claim attempts when the queue is empty.
    pub poll_interval: Duration,
    /// Cadence of liveness heartbeats.
    pub heartbeat_interval: Duration,
    /// Advisory cap on in-flight tasks. This runtime processes one task at
    /// a time; the knob is carried for operators and future runtimes.
    pub max_tasks: usize,
}

impl WorkerConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
    pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_TASKS: usize = 10;

    /// Build a config from the environment: `WORKER_POLL_INTERVAL`
    /// (seconds) and `WORKER_MAX_TASKS`, with defaults for everything
    /// unset or unparsable.
    pub fn from_env() -> Self {
        let poll_secs = std::env::var("WORKER_POLL_INTERVAL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(Self::DEFAULT_POLL_INTERVAL.as_secs());
        let max_tasks = std::env::var("WORKER_MAX_TASKS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(Self::DEFAULT_MAX_TASKS);

        Self {
            name: super::default_worker_name(),
            poll_interval: Duration::from_secs(poll_secs),
            heartbeat_interval: Self::DEFAULT_HEARTBEAT_INTERVAL,
            max_tasks,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: super::default_worker_name(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            heartbeat_interval: Self::DEFAULT_HEARTBEAT_INTERVAL,
            max_tasks: Self::DEFAULT_MAX_TASKS,
        }
    }
}

/// A single worker process: claims ready tasks one at a time and reports
/// their outcome through the guarded lifecycle transitions.
pub struct WorkerRuntime {
    pool: PgPool,
    config: WorkerConfig,
    handler: Arc<dyn TaskHandler>,
    shutdown: CancellationToken,
}

impl WorkerRuntime {
    pub fn new(pool: PgPool, config: WorkerConfig, handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            pool,
            config,
            handler,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the loop when cancelled. The current task is
    /// finished before the runtime drains.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the worker until the shutdown token is cancelled.
    ///
    /// Registers the worker, then loops: heartbeat when due, claim, execute
    /// through the handler, report Complete/Fail. Transient store errors
    /// are logged and retried on the next iteration. On shutdown the
    /// worker flips its own status to `inactive`.
    pub async fn run(&self) -> Result<()> {
        let worker = super::register_worker(&self.pool, &self.config.name).await?;
        tracing::info!(
            worker = %worker.id,
            name = %worker.name,
            poll_interval = ?self.config.poll_interval,
            max_tasks = self.config.max_tasks,
            "worker started"
        );

        // Registration stamps the first heartbeat.
        let mut last_heartbeat = Instant::now();

        while !self.shutdown.is_cancelled() {
            if last_heartbeat.elapsed() >= self.config.heartbeat_interval {
                match super::update_heartbeat(&self.pool, worker.id).await {
                    Ok(_) => last_heartbeat = Instant::now(),
                    Err(e) => {
                        tracing::warn!(worker = %worker.id, error = %e, "heartbeat failed")
                    }
                }
            }

            match claim::claim_next(&self.pool, worker.id).await {
                Ok(Some(task)) => self.process_task(&task).await,
                Ok(None) => self.idle_wait().await,
                Err(e) => {
                    tracing::warn!(worker = %worker.id, error = %e, "claim failed, will retry");
                    self.idle_wait().await;
                }
            }
        }

        if let Err(e) = super::set_worker_status(&self.pool, worker.id, "inactive").await {
            tracing::warn!(worker = %worker.id, error = %e, "failed to mark worker inactive");
        }
        tracing::info!(worker = %worker.id, name = %worker.name, "worker shut down");
        Ok(())
    }

    /// Execute one claimed task and record its outcome.
    ///
    /// A Conflict on the terminal write means the task left RUNNING while
    /// we held it (paused or requeued by the reaper); the outcome is
    /// dropped, not forced.
    async fn process_task(&self, task: &Task) {
        tracing::info!(task = %task.id, name = %task.name, "processing task");

        match self.handler.execute(task).await {
            Ok(result) => {
                match lifecycle::complete_task(&self.pool, task.id, Some(result)).await {
                    Ok(_) => {}
                    Err(QueueError::Conflict { status, .. }) => {
                        tracing::warn!(
                            task = %task.id,
                            %status,
                            "task left RUNNING mid-flight, completion dropped"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(task = %task.id, error = %e, "failed to record completion")
                    }
                }
            }
            Err(e) => {
                let message = format!("{e:#}");
                tracing::warn!(task = %task.id, error = %message, "task execution failed");
                match lifecycle::fail_task(&self.pool, task.id, &message).await {
                    Ok(_) => {}
                    Err(QueueError::Conflict { status, .. }) => {
                        tracing::warn!(
                            task = %task.id,
                            %status,
                            "task left RUNNING mid-flight, failure dropped"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(task = %task.id, error = %e, "failed to record failure")
                    }
                }
            }
        }
    }

    /// Sleep for the poll interval, waking immediately on shutdown.
    async fn idle_wait(&self) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = sleep(self.config.poll_interval) => {}
        }
    }
}
