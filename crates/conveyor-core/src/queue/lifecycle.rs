//! Guarded task lifecycle transitions.
//!
//! Each operation is a single optimistic-locking UPDATE whose WHERE clause
//! carries the allowed source statuses. Zero rows updated means either the
//! task is gone (NotFound) or its status is outside the allowed set
//! (Conflict); a follow-up fetch disambiguates.
//!
//! Pausing a RUNNING task is advisory: the worker processing it is not
//! interrupted, and its eventual Complete/Fail call is rejected here with
//! a Conflict because the row is no longer RUNNING. Such an in-flight task
//! is recovered by the reaper once its worker goes quiet.

use sqlx::PgPool;
use uuid::Uuid;

use conveyor_db::models::{Task, TaskStatus};
use conveyor_db::queries::tasks as db;

use crate::error::{QueueError, Result};

/// Statuses a task can be paused from.
pub fn pausable_from(status: TaskStatus) -> bool {
    matches!(
        status,
        TaskStatus::Pending | TaskStatus::Scheduled | TaskStatus::Running
    )
}

/// Statuses a terminal write (complete/fail) is accepted from.
pub fn terminal_write_allowed(status: TaskStatus) -> bool {
    status == TaskStatus::Running
}

/// Map a zero-row guarded UPDATE into NotFound or Conflict.
async fn transition_denied(pool: &PgPool, id: Uuid, action: &'static str) -> QueueError {
    match db::get_task(pool, id).await {
        Ok(Some(task)) => QueueError::Conflict {
            id,
            status: task.status,
            action,
        },
        Ok(None) => QueueError::task_not_found(id),
        Err(e) => e.into(),
    }
}

/// Pause a task. Allowed from PENDING, SCHEDULED, and RUNNING.
pub async fn pause_task(pool: &PgPool, id: Uuid) -> Result<Task> {
    match db::pause_task(pool, id).await? {
        Some(task) => {
            tracing::info!(task = %id, "task paused");
            Ok(task)
        }
        None => Err(transition_denied(pool, id, "pause").await),
    }
}

/// Resume a PAUSED task.
///
/// The target status is decided from the preserved `scheduled_at`: a
/// future schedule time resumes to SCHEDULED, anything else (past or
/// absent) to PENDING.
pub async fn resume_task(pool: &PgPool, id: Uuid) -> Result<Task> {
    match db::resume_task(pool, id).await? {
        Some(task) => {
            tracing::info!(task = %id, status = %task.status, "task resumed");
            Ok(task)
        }
        None => Err(transition_denied(pool, id, "resume").await),
    }
}

/// Complete a RUNNING task, recording an optional JSON result.
pub async fn complete_task(
    pool: &PgPool,
    id: Uuid,
    result: Option<serde_json::Value>,
) -> Result<Task> {
    match db::complete_task(pool, id, result.as_ref()).await? {
        Some(task) => {
            tracing::info!(task = %id, "task completed");
            Ok(task)
        }
        None => Err(transition_denied(pool, id, "complete").await),
    }
}

/// Fail a RUNNING task, recording a non-empty error message.
pub async fn fail_task(pool: &PgPool, id: Uuid, error: &str) -> Result<Task> {
    if error.trim().is_empty() {
        return Err(QueueError::validation("error message must not be empty"));
    }

    match db::fail_task(pool, id, error).await? {
        Some(task) => {
            tracing::warn!(task = %id, error, "task failed");
            Ok(task)
        }
        None => Err(transition_denied(pool, id, "fail").await),
    }
}
