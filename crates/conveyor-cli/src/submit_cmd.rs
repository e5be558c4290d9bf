//! `conveyor submit`: enqueue a task from the command line.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use conveyor_core::queue::{self, TaskCreate};
use conveyor_db::models::TaskPriority;

pub async fn run_submit(
    pool: &PgPool,
    name: &str,
    payload: &str,
    priority: &str,
    scheduled_at: Option<&str>,
) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("payload must be valid JSON")?;
    let priority: TaskPriority = priority.parse()?;
    let scheduled_at = scheduled_at
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .with_context(|| format!("invalid scheduled_at: {s}"))
        })
        .transpose()?;

    let task = queue::create_task(
        pool,
        TaskCreate {
            name: name.to_owned(),
            payload,
            priority: Some(priority),
            scheduled_at,
        },
    )
    .await?;

    println!(
        "Task {} submitted (status: {}, priority: {})",
        task.id, task.status, task.priority
    );
    if let Some(at) = task.scheduled_at {
        println!("Scheduled for {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    Ok(())
}
