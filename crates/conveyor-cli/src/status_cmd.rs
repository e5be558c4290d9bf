//! `conveyor status`: queue depth by status plus the most recent tasks.

use anyhow::Result;
use sqlx::PgPool;

use conveyor_core::queue;

pub async fn run_status(pool: &PgPool) -> Result<()> {
    let stats = queue::queue_stats(pool).await?;

    println!("Queue: {} tasks", stats.total);
    println!(
        "  pending={} scheduled={} running={} paused={} completed={} failed={}",
        stats.pending, stats.scheduled, stats.running, stats.paused, stats.completed, stats.failed,
    );

    let recent = queue::list_tasks(pool, 0, 10).await?;
    if !recent.is_empty() {
        println!();
        println!("Recent tasks:");
        for task in &recent {
            println!(
                "  {} {:<10} {:<8} {} ({})",
                task.id,
                task.status.to_string(),
                task.priority.to_string(),
                task.name,
                task.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            );
        }
    }

    Ok(())
}
