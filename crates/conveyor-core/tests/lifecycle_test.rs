//! Integration tests for the guarded lifecycle transitions and the row
//! invariants they maintain.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use conveyor_core::error::QueueError;
use conveyor_core::queue::{self, TaskCreate, claim, lifecycle};
use conveyor_core::worker;
use conveyor_db::models::{Task, TaskPriority, TaskStatus, Worker};

use conveyor_test_utils::{create_test_db, drop_test_db};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

async fn submit(
    pool: &sqlx::PgPool,
    name: &str,
    scheduled_at: Option<DateTime<Utc>>,
) -> Task {
    queue::create_task(
        pool,
        TaskCreate {
            name: name.to_owned(),
            payload: json!({"job": name}),
            priority: Some(TaskPriority::Medium),
            scheduled_at,
        },
    )
    .await
    .expect("create should succeed")
}

async fn register(pool: &sqlx::PgPool) -> Worker {
    worker::register_worker(pool, "worker-lifecycle-test")
        .await
        .expect("register should succeed")
}

/// Claim the given task into RUNNING (assumes it is the only ready task).
async fn run_task(pool: &sqlx::PgPool, id: uuid::Uuid) -> Task {
    let w = register(pool).await;
    let claimed = claim::claim_next(pool, w.id)
        .await
        .unwrap()
        .expect("task should be claimable");
    assert_eq!(claimed.id, id);
    claimed
}

// ---------------------------------------------------------------------------
// Invariants after create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn created_rows_satisfy_the_state_invariants() {
    let (pool, db_name) = create_test_db().await;

    let pending = submit(&pool, "pending", None).await;
    assert_eq!(pending.status, TaskStatus::Pending);
    assert!(pending.scheduled_at.is_none());
    assert!(pending.worker_id.is_none());
    assert!(pending.started_at.is_none());
    assert!(pending.updated_at >= pending.created_at);

    let scheduled = submit(&pool, "scheduled", Some(Utc::now() + Duration::hours(1))).await;
    assert_eq!(scheduled.status, TaskStatus::Scheduled);
    assert!(scheduled.scheduled_at.is_some());
    assert!(scheduled.worker_id.is_none());
    assert!(scheduled.started_at.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// Pause / resume
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pause_then_resume_preserves_a_pending_task() {
    let (pool, db_name) = create_test_db().await;

    let task = submit(&pool, "roundtrip", None).await;

    let paused = lifecycle::pause_task(&pool, task.id).await.unwrap();
    assert_eq!(paused.status, TaskStatus::Paused);

    let resumed = lifecycle::resume_task(&pool, task.id).await.unwrap();
    assert_eq!(resumed.status, TaskStatus::Pending);
    assert_eq!(resumed.scheduled_at, task.scheduled_at);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn resume_with_future_schedule_returns_to_scheduled() {
    let (pool, db_name) = create_test_db().await;

    let at = Utc::now() + Duration::hours(2);
    let task = submit(&pool, "future", Some(at)).await;

    lifecycle::pause_task(&pool, task.id).await.unwrap();
    let resumed = lifecycle::resume_task(&pool, task.id).await.unwrap();

    assert_eq!(resumed.status, TaskStatus::Scheduled);
    let stored = resumed.scheduled_at.expect("schedule should be preserved");
    assert!((stored - at).num_seconds().abs() < 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn resume_with_past_schedule_returns_to_pending() {
    let (pool, db_name) = create_test_db().await;

    let at = Utc::now() - Duration::minutes(5);
    let task = submit(&pool, "overdue", Some(at)).await;

    lifecycle::pause_task(&pool, task.id).await.unwrap();
    let resumed = lifecycle::resume_task(&pool, task.id).await.unwrap();

    assert_eq!(resumed.status, TaskStatus::Pending);
    assert!(resumed.scheduled_at.is_some(), "schedule time is preserved");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn pause_is_allowed_from_running() {
    let (pool, db_name) = create_test_db().await;

    let task = submit(&pool, "inflight", None).await;
    run_task(&pool, task.id).await;

    let paused = lifecycle::pause_task(&pool, task.id).await.unwrap();
    assert_eq!(paused.status, TaskStatus::Paused);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn resume_of_a_non_paused_task_is_a_conflict() {
    let (pool, db_name) = create_test_db().await;

    let task = submit(&pool, "not-paused", None).await;
    let err = lifecycle::resume_task(&pool, task.id).await.unwrap_err();
    assert!(
        matches!(err, QueueError::Conflict { status: TaskStatus::Pending, .. }),
        "unexpected error: {err}"
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn pause_of_a_terminal_task_is_a_conflict() {
    let (pool, db_name) = create_test_db().await;

    let task = submit(&pool, "finished", None).await;
    run_task(&pool, task.id).await;
    lifecycle::complete_task(&pool, task.id, None).await.unwrap();

    let err = lifecycle::pause_task(&pool, task.id).await.unwrap_err();
    assert!(matches!(err, QueueError::Conflict { .. }), "{err}");

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// Complete / fail
// ---------------------------------------------------------------------------

#[tokio::test]
async fn complete_records_result_and_timestamps() {
    let (pool, db_name) = create_test_db().await;

    let task = submit(&pool, "will-finish", None).await;
    let running = run_task(&pool, task.id).await;

    let completed = lifecycle::complete_task(&pool, task.id, Some(json!({"rows": 42})))
        .await
        .unwrap();

    assert_eq!(completed.status, TaskStatus::Completed);
    assert_eq!(completed.result, Some(json!({"rows": 42})));
    assert!(completed.error.is_none());
    let finished_at = completed.completed_at.expect("completed_at should be set");
    assert!(finished_at >= running.started_at.unwrap());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn fail_records_error_and_clears_result() {
    let (pool, db_name) = create_test_db().await;

    let task = submit(&pool, "will-break", None).await;
    run_task(&pool, task.id).await;

    let failed = lifecycle::fail_task(&pool, task.id, "exploded while processing")
        .await
        .unwrap();

    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("exploded while processing"));
    assert!(failed.result.is_none());
    assert!(failed.completed_at.is_some());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn fail_requires_a_nonempty_error() {
    let (pool, db_name) = create_test_db().await;

    let task = submit(&pool, "t", None).await;
    run_task(&pool, task.id).await;

    let err = lifecycle::fail_task(&pool, task.id, "  ").await.unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)), "{err}");

    // The row is untouched.
    let current = queue::get_task(&pool, task.id).await.unwrap();
    assert_eq!(current.status, TaskStatus::Running);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn terminal_writes_off_running_are_rejected_without_mutation() {
    let (pool, db_name) = create_test_db().await;

    let task = submit(&pool, "never-ran", None).await;

    let err = lifecycle::complete_task(&pool, task.id, None).await.unwrap_err();
    assert!(
        matches!(err, QueueError::Conflict { status: TaskStatus::Pending, .. }),
        "{err}"
    );
    let err = lifecycle::fail_task(&pool, task.id, "nope").await.unwrap_err();
    assert!(matches!(err, QueueError::Conflict { .. }), "{err}");

    let current = queue::get_task(&pool, task.id).await.unwrap();
    assert_eq!(current.status, TaskStatus::Pending);
    assert!(current.completed_at.is_none());
    assert!(current.result.is_none());
    assert!(current.error.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn terminal_writes_on_missing_task_are_not_found() {
    let (pool, db_name) = create_test_db().await;

    let ghost = uuid::Uuid::new_v4();
    let err = lifecycle::complete_task(&pool, ghost, None).await.unwrap_err();
    assert!(matches!(err, QueueError::NotFound { .. }), "{err}");

    pool.close().await;
    drop_test_db(&db_name).await;
}

/// A pause landing while the worker is mid-execution wins: the worker's
/// terminal write bounces and the row stays paused.
#[tokio::test]
async fn pause_beats_the_inflight_workers_completion() {
    let (pool, db_name) = create_test_db().await;

    let task = submit(&pool, "contested", None).await;
    run_task(&pool, task.id).await;

    // Controller pauses while the worker is still processing.
    lifecycle::pause_task(&pool, task.id).await.unwrap();

    // The worker finishes and tries to report.
    let err = lifecycle::complete_task(&pool, task.id, Some(json!({"late": true})))
        .await
        .unwrap_err();
    assert!(
        matches!(err, QueueError::Conflict { status: TaskStatus::Paused, .. }),
        "{err}"
    );

    let current = queue::get_task(&pool, task.id).await.unwrap();
    assert_eq!(current.status, TaskStatus::Paused);
    assert!(current.completed_at.is_none());
    assert!(current.result.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}
