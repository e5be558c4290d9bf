use std::env;

/// Database configuration.
///
/// Reads `DATABASE_URL` from the environment. When unset, the URL is
/// assembled from the individual `POSTGRES_HOST` / `POSTGRES_PORT` /
/// `POSTGRES_USER` / `POSTGRES_PASSWORD` / `POSTGRES_DB` variables so local
/// setups work without a full connection string. Pool sizing comes from
/// `DATABASE_POOL_SIZE`.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
    /// Upper bound on pooled connections.
    pub pool_size: u32,
}

impl DbConfig {
    pub const DEFAULT_POOL_SIZE: u32 = 5;

    /// Build a config from the environment.
    ///
    /// Priority: `DATABASE_URL`, then assembly from `POSTGRES_*` variables
    /// with localhost defaults.
    pub fn from_env() -> Self {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| Self::assemble_from_parts());
        let pool_size = env::var("DATABASE_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::DEFAULT_POOL_SIZE);
        Self {
            database_url,
            pool_size,
        }
    }

    /// Build a config from an explicit URL (tests and CLI flags).
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            pool_size: Self::DEFAULT_POOL_SIZE,
        }
    }

    fn assemble_from_parts() -> String {
        let host = env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_owned());
        let port = env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".to_owned());
        let user = env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_owned());
        let password = env::var("POSTGRES_PASSWORD").unwrap_or_else(|_| "postgres".to_owned());
        let db = env::var("POSTGRES_DB").unwrap_or_else(|_| "taskqueue".to_owned());
        format!("postgresql://{user}:{password}@{host}:{port}/{db}")
    }

    /// Extract the database name from the URL.
    ///
    /// Returns `None` if the URL cannot be parsed or has no path component.
    pub fn database_name(&self) -> Option<&str> {
        // URLs look like: postgresql://host:port/dbname
        self.database_url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
    }

    /// Return a URL pointing at the `postgres` maintenance database on the
    /// same host. Used to issue `CREATE DATABASE` when the target database
    /// does not yet exist.
    pub fn maintenance_url(&self) -> String {
        match self.database_url.rfind('/') {
            Some(pos) => {
                let mut url = self.database_url[..pos].to_owned();
                url.push_str("/postgres");
                url
            }
            None => self.database_url.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_new() {
        let cfg = DbConfig::new("postgresql://remotehost:5433/other");
        assert_eq!(cfg.database_url, "postgresql://remotehost:5433/other");
        assert_eq!(cfg.database_name(), Some("other"));
        assert_eq!(cfg.pool_size, DbConfig::DEFAULT_POOL_SIZE);
    }

    #[test]
    fn database_name_extraction() {
        let cfg = DbConfig::new("postgresql://localhost:5432/taskqueue");
        assert_eq!(cfg.database_name(), Some("taskqueue"));
    }

    #[test]
    fn maintenance_url_replaces_db() {
        let cfg = DbConfig::new("postgresql://localhost:5432/taskqueue");
        assert_eq!(
            cfg.maintenance_url(),
            "postgresql://localhost:5432/postgres"
        );
    }
}
