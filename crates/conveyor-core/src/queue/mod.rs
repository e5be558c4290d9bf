//! Validated task-queue operations.
//!
//! This module is the boundary the HTTP layer and the worker runtime talk
//! to: it validates input, applies defaults, and translates repository
//! results into the [`QueueError`] taxonomy. The raw SQL lives in
//! `conveyor_db::queries`.

pub mod claim;
pub mod lifecycle;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use conveyor_db::models::{Task, TaskPriority, TaskStatus};
use conveyor_db::queries::tasks as db;

pub use conveyor_db::queries::tasks::QueueStats;

use crate::error::{QueueError, Result};

/// Default page size when the caller does not pass a limit.
pub const DEFAULT_LIST_LIMIT: i64 = 100;

/// Hard cap on page size.
pub const MAX_LIST_LIMIT: i64 = 1000;

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

/// Input for submitting a task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskCreate {
    pub name: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Partial update of a task; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(QueueError::validation("task name must not be empty"));
    }
    Ok(())
}

fn validate_payload(payload: &serde_json::Value) -> Result<()> {
    if !payload.is_object() {
        return Err(QueueError::validation("task payload must be a JSON object"));
    }
    Ok(())
}

/// Clamp pagination arguments to sane bounds.
fn clamp_page(skip: i64, limit: i64) -> (i64, i64) {
    (skip.max(0), limit.clamp(1, MAX_LIST_LIMIT))
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Submit a new task.
///
/// Priority defaults to MEDIUM. The initial status is SCHEDULED when a
/// schedule time is given, PENDING otherwise.
pub async fn create_task(pool: &PgPool, input: TaskCreate) -> Result<Task> {
    validate_name(&input.name)?;
    validate_payload(&input.payload)?;

    let new = db::NewTask {
        name: input.name,
        payload: input.payload,
        priority: input.priority.unwrap_or(TaskPriority::Medium),
        scheduled_at: input.scheduled_at,
    };
    let task = db::insert_task(pool, &new).await?;

    tracing::info!(task = %task.id, name = %task.name, status = %task.status, "task created");
    Ok(task)
}

/// Fetch a task by ID.
pub async fn get_task(pool: &PgPool, id: Uuid) -> Result<Task> {
    db::get_task(pool, id)
        .await?
        .ok_or_else(|| QueueError::task_not_found(id))
}

/// List tasks ordered by insertion time.
pub async fn list_tasks(pool: &PgPool, skip: i64, limit: i64) -> Result<Vec<Task>> {
    let (skip, limit) = clamp_page(skip, limit);
    Ok(db::list_tasks(pool, skip, limit).await?)
}

/// List tasks with a given status, ordered by insertion time.
pub async fn list_tasks_by_status(
    pool: &PgPool,
    status: TaskStatus,
    skip: i64,
    limit: i64,
) -> Result<Vec<Task>> {
    let (skip, limit) = clamp_page(skip, limit);
    Ok(db::list_tasks_by_status(pool, status, skip, limit).await?)
}

/// Total task count.
pub async fn count_tasks(pool: &PgPool) -> Result<i64> {
    Ok(db::count_tasks(pool).await?)
}

/// Task count for one status.
pub async fn count_tasks_by_status(pool: &PgPool, status: TaskStatus) -> Result<i64> {
    Ok(db::count_tasks_by_status(pool, status).await?)
}

/// Task counts grouped by status.
pub async fn queue_stats(pool: &PgPool) -> Result<QueueStats> {
    Ok(db::queue_stats(pool).await?)
}

/// Apply a partial update to a task.
///
/// Status changes through this path bypass the guarded lifecycle
/// transitions of [`lifecycle`]; they exist so an operator can correct a
/// wedged row. A patch that would leave a SCHEDULED task without a
/// schedule time is rejected.
pub async fn update_task(pool: &PgPool, id: Uuid, patch: TaskUpdate) -> Result<Task> {
    if let Some(name) = &patch.name {
        validate_name(name)?;
    }
    if let Some(payload) = &patch.payload {
        validate_payload(payload)?;
    }

    if patch.status == Some(TaskStatus::Scheduled) && patch.scheduled_at.is_none() {
        let current = get_task(pool, id).await?;
        if current.scheduled_at.is_none() {
            return Err(QueueError::validation(
                "cannot mark a task scheduled without a scheduled_at time",
            ));
        }
    }

    let db_patch = db::TaskPatch {
        name: patch.name,
        payload: patch.payload,
        priority: patch.priority,
        scheduled_at: patch.scheduled_at,
        status: patch.status,
    };
    db::update_task(pool, id, &db_patch)
        .await?
        .ok_or_else(|| QueueError::task_not_found(id))
}

/// Delete a task.
pub async fn delete_task(pool: &PgPool, id: Uuid) -> Result<()> {
    if !db::delete_task(pool, id).await? {
        return Err(QueueError::task_not_found(id));
    }
    tracing::info!(task = %id, "task deleted");
    Ok(())
}
