use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use tracing::info;

use crate::config::DbConfig;

/// Migrations embedded at compile time from `crates/conveyor-db/migrations`.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// SQLSTATE raised by `CREATE DATABASE` when the database already exists.
const DUPLICATE_DATABASE: &str = "42P04";

/// How long an acquire may wait before a wedged store becomes a visible
/// error instead of a hung claim loop.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Open a connection pool sized per the config.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("cannot reach PostgreSQL at {}", config.database_url))?;
    Ok(pool)
}

/// Run all pending migrations against the pool.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;

    info!("migrations applied successfully");
    Ok(())
}

/// Create the configured database when it is missing.
///
/// Opens a single connection to the server's `postgres` maintenance
/// database and issues `CREATE DATABASE`, treating "already exists" as
/// success so `conveyor db-init` can be re-run freely.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<()> {
    let db_name = config
        .database_name()
        .context("database URL has no database name")?;

    // CREATE DATABASE cannot take a bound parameter, so the name is
    // restricted to identifier characters before it is interpolated.
    if db_name.is_empty()
        || !db_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        anyhow::bail!("refusing to create database with non-identifier name {db_name:?}");
    }

    let maintenance_url = config.maintenance_url();
    let mut conn = PgConnection::connect(&maintenance_url)
        .await
        .with_context(|| format!("cannot reach maintenance database at {maintenance_url}"))?;

    let stmt = format!("CREATE DATABASE {db_name}");
    let created = match conn.execute(stmt.as_str()).await {
        Ok(_) => true,
        Err(sqlx::Error::Database(db_err))
            if db_err.code().as_deref() == Some(DUPLICATE_DATABASE) =>
        {
            false
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to create database {db_name}"));
        }
    };
    info!(db = db_name, created, "database ready");

    let _ = conn.close().await;
    Ok(())
}

/// Row counts for the queue tables, shown by `conveyor db-init`.
pub async fn table_counts(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let mut counts = Vec::with_capacity(2);
    for table in ["tasks", "workers"] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .with_context(|| format!("failed to count rows in {table}"))?;
        counts.push((table.to_owned(), count));
    }
    Ok(counts)
}
