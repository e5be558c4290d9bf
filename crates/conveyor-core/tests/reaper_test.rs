//! Integration tests for heartbeat-timeout recovery.

use serde_json::json;

use conveyor_core::queue::{self, TaskCreate, claim};
use conveyor_core::reaper::{self, ReaperConfig};
use conveyor_core::worker;
use conveyor_db::models::{Task, TaskStatus, Worker};

use conveyor_test_utils::{create_test_db, drop_test_db};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

async fn submit(pool: &sqlx::PgPool, name: &str) -> Task {
    queue::create_task(
        pool,
        TaskCreate {
            name: name.to_owned(),
            payload: json!({}),
            priority: None,
            scheduled_at: None,
        },
    )
    .await
    .expect("create should succeed")
}

async fn register(pool: &sqlx::PgPool, name: &str) -> Worker {
    worker::register_worker(pool, name)
        .await
        .expect("register should succeed")
}

/// Backdate a worker's heartbeat far past any reasonable timeout.
async fn silence_worker(pool: &sqlx::PgPool, id: uuid::Uuid) {
    sqlx::query("UPDATE workers SET last_heartbeat = NOW() - INTERVAL '10 minutes' WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .expect("backdating heartbeat should succeed");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_requeues_tasks_of_a_silent_worker() {
    let (pool, db_name) = create_test_db().await;

    let task = submit(&pool, "stranded").await;
    let w = register(&pool, "doomed-worker").await;
    claim::claim_next(&pool, w.id).await.unwrap().unwrap();

    silence_worker(&pool, w.id).await;

    let requeued = reaper::sweep(&pool, &ReaperConfig::default()).await.unwrap();
    assert_eq!(requeued.len(), 1);
    assert_eq!(requeued[0].id, task.id);

    let current = queue::get_task(&pool, task.id).await.unwrap();
    assert_eq!(current.status, TaskStatus::Pending);
    assert!(current.worker_id.is_none());
    assert!(current.started_at.is_none());

    let swept = worker::get_worker(&pool, w.id).await.unwrap();
    assert_eq!(swept.status, "inactive");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn sweep_leaves_live_workers_alone() {
    let (pool, db_name) = create_test_db().await;

    let task = submit(&pool, "healthy").await;
    let w = register(&pool, "live-worker").await;
    claim::claim_next(&pool, w.id).await.unwrap().unwrap();

    let requeued = reaper::sweep(&pool, &ReaperConfig::default()).await.unwrap();
    assert!(requeued.is_empty());

    let current = queue::get_task(&pool, task.id).await.unwrap();
    assert_eq!(current.status, TaskStatus::Running);
    assert_eq!(current.worker_id, Some(w.id));

    let alive = worker::get_worker(&pool, w.id).await.unwrap();
    assert_eq!(alive.status, "active");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn sweep_recovers_tasks_with_a_dangling_worker_reference() {
    let (pool, db_name) = create_test_db().await;

    let task = submit(&pool, "orphaned").await;
    let w = register(&pool, "vanishing-worker").await;
    claim::claim_next(&pool, w.id).await.unwrap().unwrap();

    // Deleting the worker row must not touch the task; the reference just
    // dangles until the reaper passes.
    sqlx::query("DELETE FROM workers WHERE id = $1")
        .bind(w.id)
        .execute(&pool)
        .await
        .unwrap();

    let still_there = queue::get_task(&pool, task.id).await.unwrap();
    assert_eq!(still_there.status, TaskStatus::Running);

    let requeued = reaper::sweep(&pool, &ReaperConfig::default()).await.unwrap();
    assert_eq!(requeued.len(), 1);
    assert_eq!(requeued[0].id, task.id);
    assert_eq!(requeued[0].status, TaskStatus::Pending);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn requeued_tasks_are_claimable_again() {
    let (pool, db_name) = create_test_db().await;

    let task = submit(&pool, "second-chance").await;
    let dead = register(&pool, "dead-worker").await;
    claim::claim_next(&pool, dead.id).await.unwrap().unwrap();

    silence_worker(&pool, dead.id).await;
    reaper::sweep(&pool, &ReaperConfig::default()).await.unwrap();

    let fresh = register(&pool, "fresh-worker").await;
    let reclaimed = claim::claim_next(&pool, fresh.id)
        .await
        .unwrap()
        .expect("requeued task should be claimable");
    assert_eq!(reclaimed.id, task.id);
    assert_eq!(reclaimed.worker_id, Some(fresh.id));

    pool.close().await;
    drop_test_db(&db_name).await;
}
