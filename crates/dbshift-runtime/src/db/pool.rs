use std::time::Duration;

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use dbshift_core::config::DatabaseConfig;
use dbshift_core::dialect::Dialect;
use dbshift_core::error::{Result, ShiftError};

use super::runner::SqlxQueryRunner;

/// Database connection wrapper providing connection pooling.
#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
    dialect: Dialect,
    config: DatabaseConfig,
}

impl Database {
    /// Create a new database connection from configuration.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let dialect = config.dialect()?;
        let url = driver_url(&config.url, dialect)?;
        sqlx::any::install_default_drivers();

        let mut options = AnyPoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));
        if dialect == Dialect::Sqlite && is_memory_url(&url) {
            // Each connection to `:memory:` is its own database.
            options = options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            options = options.max_connections(4);
        }

        let pool = options
            .connect(&url)
            .await
            .map_err(|e| ShiftError::Database(format!("Failed to connect: {}", e)))?;

        Ok(Self {
            pool,
            dialect,
            config: config.clone(),
        })
    }

    /// Connect with default settings.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::from_config(&DatabaseConfig {
            url: url.to_string(),
            ..Default::default()
        })
        .await
    }

    /// Check out one connection for the exclusive use of a run.
    pub async fn runner(&self) -> Result<SqlxQueryRunner> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| ShiftError::Database(format!("Failed to acquire connection: {}", e)))?;
        let mut runner = SqlxQueryRunner::new(conn, self.dialect);
        if matches!(self.dialect, Dialect::Postgres | Dialect::CockroachDb) {
            runner
                .run_raw(&format!(
                    "SET statement_timeout = {}",
                    self.config.statement_timeout_secs * 1000
                ))
                .await?;
        }
        Ok(runner)
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| ShiftError::Database(format!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Close all connections gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Map dialect-only URL schemes onto the driver that speaks the protocol.
fn driver_url(url: &str, dialect: Dialect) -> Result<String> {
    let rest = url.split_once("://").map(|(_, rest)| rest);
    match (dialect, rest) {
        (Dialect::Mssql, _) => Err(ShiftError::Config(
            "SQL Server has no bundled driver; provide a QueryRunner implementation".into(),
        )),
        (Dialect::MariaDb, Some(rest)) => Ok(format!("mysql://{}", rest)),
        (Dialect::CockroachDb, Some(rest)) if !url.starts_with("postgres") => {
            Ok(format!("postgres://{}", rest))
        }
        _ => Ok(url.to_string()),
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_url() {
        assert_eq!(
            driver_url("mariadb://root@localhost/app", Dialect::MariaDb).unwrap(),
            "mysql://root@localhost/app"
        );
        assert_eq!(
            driver_url("cockroachdb://root@localhost:26257/app", Dialect::CockroachDb).unwrap(),
            "postgres://root@localhost:26257/app"
        );
        assert_eq!(
            driver_url("postgres://localhost/app", Dialect::CockroachDb).unwrap(),
            "postgres://localhost/app"
        );
        assert!(matches!(
            driver_url("mssql://localhost/app", Dialect::Mssql),
            Err(ShiftError::Config(_))
        ));
    }

    #[test]
    fn test_memory_url() {
        assert!(is_memory_url("sqlite::memory:"));
        assert!(is_memory_url("sqlite:file:test?mode=memory&cache=shared"));
        assert!(!is_memory_url("sqlite://data.db"));
    }

    #[tokio::test]
    async fn test_sqlite_memory_pool() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        assert_eq!(db.dialect(), Dialect::Sqlite);
        db.health_check().await.unwrap();
        db.close().await;
    }
}
