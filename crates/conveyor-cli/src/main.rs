mod serve_cmd;
mod status_cmd;
mod submit_cmd;
mod worker_cmd;

use clap::{Parser, Subcommand};

use conveyor_db::config::DbConfig;
use conveyor_db::pool;

#[derive(Parser)]
#[command(name = "conveyor", about = "PostgreSQL-backed persistent task queue")]
struct Cli {
    /// Database URL (overrides the DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the conveyor database and run migrations
    DbInit,
    /// Run the HTTP control plane (includes the recovery reaper)
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Run a worker process until interrupted
    Worker {
        /// Seconds to sleep between claim attempts when the queue is empty
        #[arg(long)]
        poll_interval: Option<u64>,
        /// Registered worker name (default: worker-<host>-<pid>)
        #[arg(long)]
        name: Option<String>,
    },
    /// Submit a task to the queue
    Submit {
        /// Task name
        name: String,
        /// Task payload as a JSON object
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Priority: LOW, MEDIUM, HIGH, or CRITICAL
        #[arg(long, default_value = "MEDIUM")]
        priority: String,
        /// Earliest dispatch time (RFC 3339, e.g. 2026-08-01T12:00:00Z)
        #[arg(long)]
        scheduled_at: Option<String>,
    },
    /// Show queue depth by status and the most recent tasks
    Status,
}

fn resolve_db_config(cli_url: Option<&str>) -> DbConfig {
    match cli_url {
        Some(url) => DbConfig::new(url),
        None => DbConfig::from_env(),
    }
}

/// Execute the `conveyor db-init` command: create database and run
/// migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let db_config = resolve_db_config(cli_db_url);

    println!("Initializing conveyor database...");

    pool::ensure_database_exists(&db_config).await?;
    let db_pool = pool::create_pool(&db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("conveyor db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Serve { bind, port } => {
            let db_config = resolve_db_config(cli.database_url.as_deref());
            let db_pool = pool::create_pool(&db_config).await?;
            let result = serve_cmd::run_serve(db_pool.clone(), &bind, port).await;
            db_pool.close().await;
            result?;
        }
        Commands::Worker {
            poll_interval,
            name,
        } => {
            let db_config = resolve_db_config(cli.database_url.as_deref());
            let db_pool = pool::create_pool(&db_config).await?;
            let result = worker_cmd::run_worker(db_pool.clone(), poll_interval, name).await;
            db_pool.close().await;
            result?;
        }
        Commands::Submit {
            name,
            payload,
            priority,
            scheduled_at,
        } => {
            let db_config = resolve_db_config(cli.database_url.as_deref());
            let db_pool = pool::create_pool(&db_config).await?;
            let result = submit_cmd::run_submit(
                &db_pool,
                &name,
                &payload,
                &priority,
                scheduled_at.as_deref(),
            )
            .await;
            db_pool.close().await;
            result?;
        }
        Commands::Status => {
            let db_config = resolve_db_config(cli.database_url.as_deref());
            let db_pool = pool::create_pool(&db_config).await?;
            let result = status_cmd::run_status(&db_pool).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
