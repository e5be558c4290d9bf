//! The dispatch engine: hand the next ready task to a worker.
//!
//! The whole claim is one SQL statement (see
//! [`conveyor_db::queries::tasks::claim_next_task`]): select the best ready
//! row with `FOR UPDATE SKIP LOCKED`, flip it to RUNNING, stamp the worker
//! and `started_at`, and return it. Under concurrent callers each ready
//! task is returned to at most one of them; a caller whose pick was locked
//! by a sibling gets the next ready row or none, never a block.

use sqlx::PgPool;
use uuid::Uuid;

use conveyor_db::models::Task;
use conveyor_db::queries::tasks as db;

use crate::error::Result;

/// Claim the next ready task for `worker_id`.
///
/// Ready means PENDING, or SCHEDULED with `scheduled_at` at or before now
/// (inclusive). Selection order: priority CRITICAL > HIGH > MEDIUM > LOW,
/// then earliest `scheduled_at` with unscheduled tasks first, then
/// earliest `created_at`, then `id`.
///
/// Returns `None` when the ready set is empty or every ready row is
/// currently locked by another claimer.
pub async fn claim_next(pool: &PgPool, worker_id: Uuid) -> Result<Option<Task>> {
    let claimed = db::claim_next_task(pool, worker_id).await?;

    if let Some(task) = &claimed {
        tracing::debug!(
            task = %task.id,
            name = %task.name,
            priority = %task.priority,
            worker = %worker_id,
            "claimed task"
        );
    }

    Ok(claimed)
}
