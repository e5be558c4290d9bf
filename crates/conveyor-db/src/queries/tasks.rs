//! Database query functions for the `tasks` table, including the atomic
//! claim-next statement the dispatch engine is built on.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Task, TaskPriority, TaskStatus};

/// Fields for inserting a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub payload: serde_json::Value,
    pub priority: TaskPriority,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Partial update of a task. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub priority: Option<TaskPriority>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: Option<TaskStatus>,
}

/// Insert a new task row. Returns the inserted task with server-generated
/// defaults (id, timestamps).
///
/// The initial status is derived here: `scheduled` when a schedule time is
/// present, `pending` otherwise.
pub async fn insert_task(pool: &PgPool, new: &NewTask) -> Result<Task> {
    let status = if new.scheduled_at.is_some() {
        TaskStatus::Scheduled
    } else {
        TaskStatus::Pending
    };

    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO tasks (name, payload, status, priority, scheduled_at) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(&new.name)
    .bind(&new.payload)
    .bind(status)
    .bind(new.priority)
    .bind(new.scheduled_at)
    .fetch_one(pool)
    .await
    .context("failed to insert task")?;

    Ok(task)
}

/// Fetch a single task by ID.
pub async fn get_task(pool: &PgPool, id: Uuid) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch task")?;

    Ok(task)
}

/// List tasks ordered by insertion time, with pagination.
pub async fn list_tasks(pool: &PgPool, skip: i64, limit: i64) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks ORDER BY created_at ASC, id ASC OFFSET $1 LIMIT $2",
    )
    .bind(skip)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list tasks")?;

    Ok(tasks)
}

/// List tasks with a given status, ordered by insertion time.
pub async fn list_tasks_by_status(
    pool: &PgPool,
    status: TaskStatus,
    skip: i64,
    limit: i64,
) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE status = $1 \
         ORDER BY created_at ASC, id ASC OFFSET $2 LIMIT $3",
    )
    .bind(status)
    .bind(skip)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list tasks by status")?;

    Ok(tasks)
}

/// Total number of tasks.
pub async fn count_tasks(pool: &PgPool) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
        .fetch_one(pool)
        .await
        .context("failed to count tasks")?;

    Ok(row.0)
}

/// Number of tasks with a given status.
pub async fn count_tasks_by_status(pool: &PgPool, status: TaskStatus) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE status = $1")
        .bind(status)
        .fetch_one(pool)
        .await
        .context("failed to count tasks by status")?;

    Ok(row.0)
}

/// Task counts grouped by status.
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub pending: i64,
    pub scheduled: i64,
    pub running: i64,
    pub paused: i64,
    pub completed: i64,
    pub failed: i64,
    pub total: i64,
}

/// Get a summary of task counts by status.
pub async fn queue_stats(pool: &PgPool) -> Result<QueueStats> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) as cnt FROM tasks GROUP BY status")
            .fetch_all(pool)
            .await
            .context("failed to get queue stats")?;

    let mut stats = QueueStats::default();
    for (status, count) in &rows {
        match status.as_str() {
            "pending" => stats.pending = *count,
            "scheduled" => stats.scheduled = *count,
            "running" => stats.running = *count,
            "paused" => stats.paused = *count,
            "completed" => stats.completed = *count,
            "failed" => stats.failed = *count,
            _ => {}
        }
        stats.total += count;
    }
    Ok(stats)
}

/// Apply a partial update to a task.
///
/// Only the fields present in the patch are written; `updated_at` is always
/// refreshed. Returns `None` when the task does not exist. Status changes
/// through this path bypass the guarded lifecycle transitions; this is the
/// operator-correction escape hatch, not the normal state machine.
pub async fn update_task(pool: &PgPool, id: Uuid, patch: &TaskPatch) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>(
        "UPDATE tasks \
         SET name = COALESCE($2, name), \
             payload = COALESCE($3, payload), \
             priority = COALESCE($4, priority), \
             scheduled_at = COALESCE($5, scheduled_at), \
             status = COALESCE($6, status), \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING *",
    )
    .bind(id)
    .bind(&patch.name)
    .bind(&patch.payload)
    .bind(patch.priority)
    .bind(patch.scheduled_at)
    .bind(patch.status)
    .fetch_optional(pool)
    .await
    .context("failed to update task")?;

    Ok(task)
}

/// Delete a task by ID. Returns whether a row was removed.
pub async fn delete_task(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete task")?;

    Ok(result.rows_affected() > 0)
}

// -----------------------------------------------------------------------
// Dispatch
// -----------------------------------------------------------------------

/// Atomically claim the next ready task for a worker.
///
/// The ready set is `pending` tasks plus `scheduled` tasks whose schedule
/// time has arrived (inclusive). Selection order: priority descending,
/// then `scheduled_at` ascending with NULLs first (an unscheduled task has
/// been ready forever), then `created_at`, then `id` to keep the order
/// total. `FOR UPDATE SKIP LOCKED` makes concurrent claimers pass over a
/// row another transaction holds instead of blocking on it, so each ready
/// task is handed to at most one caller.
pub async fn claim_next_task(pool: &PgPool, worker_id: Uuid) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>(
        "WITH ready AS ( \
             SELECT id FROM tasks \
             WHERE status = 'pending' \
                OR (status = 'scheduled' AND scheduled_at <= NOW()) \
             ORDER BY priority DESC, \
                      scheduled_at ASC NULLS FIRST, \
                      created_at ASC, \
                      id ASC \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED \
         ) \
         UPDATE tasks \
         SET status = 'running', \
             started_at = NOW(), \
             worker_id = $1, \
             updated_at = NOW() \
         WHERE id IN (SELECT id FROM ready) \
         RETURNING *",
    )
    .bind(worker_id)
    .fetch_optional(pool)
    .await
    .context("failed to claim next task")?;

    Ok(task)
}

// -----------------------------------------------------------------------
// Guarded transitions
// -----------------------------------------------------------------------

/// Transition a task to `paused` if it is currently pending, scheduled, or
/// running. Returns `None` when no row matched (missing task or a status
/// outside the allowed set -- the caller disambiguates).
pub async fn pause_task(pool: &PgPool, id: Uuid) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>(
        "UPDATE tasks \
         SET status = 'paused', updated_at = NOW() \
         WHERE id = $1 AND status IN ('pending', 'scheduled', 'running') \
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to pause task")?;

    Ok(task)
}

/// Transition a `paused` task back into the ready set.
///
/// The target status is decided from the preserved `scheduled_at`: a future
/// schedule time resumes to `scheduled`, anything else to `pending`.
pub async fn resume_task(pool: &PgPool, id: Uuid) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>(
        "UPDATE tasks \
         SET status = CASE \
                 WHEN scheduled_at IS NOT NULL AND scheduled_at > NOW() THEN 'scheduled' \
                 ELSE 'pending' \
             END, \
             updated_at = NOW() \
         WHERE id = $1 AND status = 'paused' \
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to resume task")?;

    Ok(task)
}

/// Transition a `running` task to `completed`, recording the result.
pub async fn complete_task(
    pool: &PgPool,
    id: Uuid,
    result: Option<&serde_json::Value>,
) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>(
        "UPDATE tasks \
         SET status = 'completed', \
             completed_at = NOW(), \
             result = $2, \
             error = NULL, \
             updated_at = NOW() \
         WHERE id = $1 AND status = 'running' \
         RETURNING *",
    )
    .bind(id)
    .bind(result)
    .fetch_optional(pool)
    .await
    .context("failed to complete task")?;

    Ok(task)
}

/// Transition a `running` task to `failed`, recording the error text.
pub async fn fail_task(pool: &PgPool, id: Uuid, error: &str) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>(
        "UPDATE tasks \
         SET status = 'failed', \
             completed_at = NOW(), \
             error = $2, \
             result = NULL, \
             updated_at = NOW() \
         WHERE id = $1 AND status = 'running' \
         RETURNING *",
    )
    .bind(id)
    .bind(error)
    .fetch_optional(pool)
    .await
    .context("failed to fail task")?;

    Ok(task)
}

// -----------------------------------------------------------------------
// Recovery
// -----------------------------------------------------------------------

/// Re-pend every `running` task whose worker is missing or has not
/// heartbeated since `cutoff`.
///
/// The claiming worker reference and `started_at` are cleared so the task
/// re-enters the ready set as if never claimed. Returns the requeued tasks.
pub async fn requeue_abandoned_tasks(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "UPDATE tasks t \
         SET status = 'pending', \
             worker_id = NULL, \
             started_at = NULL, \
             updated_at = NOW() \
         WHERE t.status = 'running' \
           AND NOT EXISTS ( \
               SELECT 1 FROM workers w \
               WHERE w.id = t.worker_id AND w.last_heartbeat >= $1 \
           ) \
         RETURNING *",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await
    .context("failed to requeue abandoned tasks")?;

    Ok(tasks)
}
