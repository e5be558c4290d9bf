//! Worker lifecycle: registration, heartbeat, status -- plus the runtime
//! loop that claims and processes tasks.

pub mod handler;
pub mod runtime;

pub use handler::TaskHandler;
pub use runtime::{WorkerConfig, WorkerRuntime};

use sqlx::PgPool;
use uuid::Uuid;

use conveyor_db::models::Worker;
use conveyor_db::queries::workers as db;

use crate::error::{QueueError, Result};

/// Register a new worker with status `active`.
pub async fn register_worker(pool: &PgPool, name: &str) -> Result<Worker> {
    if name.trim().is_empty() {
        return Err(QueueError::validation("worker name must not be empty"));
    }
    let worker = db::insert_worker(pool, name).await?;
    tracing::info!(worker = %worker.id, name = %worker.name, "worker registered");
    Ok(worker)
}

/// Fetch a worker by ID.
pub async fn get_worker(pool: &PgPool, id: Uuid) -> Result<Worker> {
    db::get_worker(pool, id)
        .await?
        .ok_or_else(|| QueueError::worker_not_found(id))
}

/// Refresh a worker's liveness heartbeat.
pub async fn update_heartbeat(pool: &PgPool, id: Uuid) -> Result<Worker> {
    db::update_heartbeat(pool, id)
        .await?
        .ok_or_else(|| QueueError::worker_not_found(id))
}

/// Set a worker's status string (`active` and `inactive` are the values
/// the core interprets; anything else is carried opaquely).
pub async fn set_worker_status(pool: &PgPool, id: Uuid, status: &str) -> Result<Worker> {
    if status.trim().is_empty() {
        return Err(QueueError::validation("worker status must not be empty"));
    }
    db::set_worker_status(pool, id, status)
        .await?
        .ok_or_else(|| QueueError::worker_not_found(id))
}

/// Conventional worker name: `worker-<host>-<pid>`.
pub fn default_worker_name() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_owned());
    format!("worker-{host}-{}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_name_has_pid_suffix() {
        let name = default_worker_name();
        assert!(name.starts_with("worker-"), "{name}");
        assert!(
            name.ends_with(&std::process::id().to_string()),
            "{name} should end with the pid"
        );
    }
}
