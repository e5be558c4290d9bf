//! Database query functions for the `workers` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Worker;

/// Insert a new worker row with status `active`. Returns the inserted
/// worker with server-generated defaults (id, heartbeat, timestamps).
pub async fn insert_worker(pool: &PgPool, name: &str) -> Result<Worker> {
    let worker = sqlx::query_as::<_, Worker>(
        "INSERT INTO workers (name) VALUES ($1) RETURNING *",
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .context("failed to insert worker")?;

    Ok(worker)
}

/// Fetch a single worker by ID.
pub async fn get_worker(pool: &PgPool, id: Uuid) -> Result<Option<Worker>> {
    let worker = sqlx::query_as::<_, Worker>("SELECT * FROM workers WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch worker")?;

    Ok(worker)
}

/// Refresh a worker's liveness heartbeat. Returns `None` when the worker
/// does not exist.
pub async fn update_heartbeat(pool: &PgPool, id: Uuid) -> Result<Option<Worker>> {
    let worker = sqlx::query_as::<_, Worker>(
        "UPDATE workers \
         SET last_heartbeat = NOW(), updated_at = NOW() \
         WHERE id = $1 \
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update worker heartbeat")?;

    Ok(worker)
}

/// Set a worker's status string. Returns `None` when the worker does not
/// exist.
pub async fn set_worker_status(pool: &PgPool, id: Uuid, status: &str) -> Result<Option<Worker>> {
    let worker = sqlx::query_as::<_, Worker>(
        "UPDATE workers \
         SET status = $2, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING *",
    )
    .bind(id)
    .bind(status)
    .fetch_optional(pool)
    .await
    .context("failed to set worker status")?;

    Ok(worker)
}

/// Flip every `active` worker whose heartbeat predates `cutoff` to
/// `inactive`. Returns the workers that were swept.
pub async fn mark_stale_workers_inactive(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Worker>> {
    let workers = sqlx::query_as::<_, Worker>(
        "UPDATE workers \
         SET status = 'inactive', updated_at = NOW() \
         WHERE status = 'active' AND last_heartbeat < $1 \
         RETURNING *",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await
    .context("failed to mark stale workers inactive")?;

    Ok(workers)
}
