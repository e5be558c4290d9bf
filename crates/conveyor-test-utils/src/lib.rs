//! PostgreSQL fixtures for conveyor's integration tests.
//!
//! All tests in a binary share one PostgreSQL server, and every test
//! brackets itself with a throwaway database. The throwaway databases are
//! created through the same bootstrap path `conveyor db-init` takes
//! ([`conveyor_db::pool`]), so the fixtures exercise the production pool
//! and migration code rather than a parallel test-only implementation.
//!
//! The shared server is either an external one named by [`PG_URL_ENV`]
//! (e.g. started once by a nextest setup script) or a testcontainers
//! instance started lazily and kept alive for the life of the process.

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use conveyor_db::config::DbConfig;
use conveyor_db::pool;

/// Env var naming an external PostgreSQL server to run tests against.
/// The URL must not carry a database path; throwaway databases are
/// created under it.
pub const PG_URL_ENV: &str = "CONVEYOR_TEST_PG_URL";

/// Name prefix for throwaway databases, so leftovers from a killed test
/// run are recognizable on the server.
const DB_NAME_PREFIX: &str = "conveyor_test";

enum SharedServer {
    External(String),
    Container {
        base_url: String,
        /// Kept alive for the life of the process.
        _container: ContainerAsync<Postgres>,
    },
}

impl SharedServer {
    fn base_url(&self) -> &str {
        match self {
            Self::External(url) => url,
            Self::Container { base_url, .. } => base_url,
        }
    }
}

static SERVER: OnceCell<SharedServer> = OnceCell::const_new();

async fn shared_server() -> &'static SharedServer {
    SERVER
        .get_or_init(|| async {
            if let Ok(url) = std::env::var(PG_URL_ENV) {
                return SharedServer::External(url);
            }

            let container = Postgres::default()
                .with_tag("18")
                .start()
                .await
                .expect("postgres test container should start");
            let host = container
                .get_host()
                .await
                .expect("container host should resolve");
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("container port 5432 should be mapped");

            SharedServer::Container {
                base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
                _container: container,
            }
        })
        .await
}

/// Base URL of the shared server (no database path).
pub async fn pg_url() -> &'static str {
    shared_server().await.base_url()
}

/// Create a throwaway database with the queue schema applied and return a
/// pool connected to it.
///
/// Tear it down with [`drop_test_db`], passing the returned name.
pub async fn create_test_db() -> (PgPool, String) {
    let db_name = format!("{DB_NAME_PREFIX}_{}", Uuid::new_v4().simple());
    let config = DbConfig::new(format!("{}/{db_name}", pg_url().await));

    pool::ensure_database_exists(&config)
        .await
        .expect("throwaway database should be creatable");
    let db_pool = pool::create_pool(&config)
        .await
        .expect("throwaway database should accept connections");
    pool::run_migrations(&db_pool)
        .await
        .expect("queue schema should apply cleanly");

    (db_pool, db_name)
}

/// Drop a throwaway database, kicking off any straggling connections
/// first. Best-effort: a database that is already gone is not an error.
pub async fn drop_test_db(db_name: &str) {
    let config = DbConfig::new(format!("{}/{db_name}", pg_url().await));

    let Ok(maint_pool) = PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.maintenance_url())
        .await
    else {
        return;
    };

    let _ = sqlx::query(
        "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
         WHERE datname = $1 AND pid <> pg_backend_pid()",
    )
    .bind(db_name)
    .execute(&maint_pool)
    .await;

    let _ = maint_pool
        .execute(format!("DROP DATABASE IF EXISTS {db_name}").as_str())
        .await;
    maint_pool.close().await;
}
