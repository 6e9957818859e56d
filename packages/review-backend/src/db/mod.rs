pub mod migrate;
pub mod operations;

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{PgPool, SqlitePool};
use thiserror::Error;

use crate::config::{DatabaseConfig, DatabaseTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbMode {
    ServerPostgres,
    DesktopSqlite,
}

#[derive(Clone)]
pub enum StorePool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Handle to the review store. Cheap to clone; every clone shares one pool.
#[derive(Clone)]
pub struct Database {
    pool: StorePool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbInitError> {
        let pool = match &config.target {
            DatabaseTarget::Postgres { url } => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(config.acquire_timeout)
                    .connect(url)
                    .await?;
                StorePool::Postgres(pool)
            }
            DatabaseTarget::Sqlite { path } => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)
                            .map_err(|e| DbInitError::Io(e.to_string()))?;
                    }
                }

                let db_url = format!("sqlite:{}?mode=rwc", path.display());
                let options = SqliteConnectOptions::from_str(&db_url)?
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .foreign_keys(true)
                    .busy_timeout(config.sqlite_busy_timeout);

                let pool = SqlitePoolOptions::new()
                    .max_connections(config.max_connections.max(1))
                    .acquire_timeout(config.acquire_timeout)
                    .connect_with(options)
                    .await?;
                StorePool::Sqlite(pool)
            }
        };

        let db = Self { pool };
        migrate::run_migrations(&db).await?;

        tracing::info!(mode = ?db.mode(), "review store ready");
        Ok(db)
    }

    pub fn pool(&self) -> &StorePool {
        &self.pool
    }

    pub fn mode(&self) -> DbMode {
        match self.pool {
            StorePool::Postgres(_) => DbMode::ServerPostgres,
            StorePool::Sqlite(_) => DbMode::DesktopSqlite,
        }
    }

    pub async fn ping(&self, timeout: Duration) -> Result<Duration, String> {
        let started = std::time::Instant::now();
        let result = match &self.pool {
            StorePool::Postgres(pool) => {
                tokio::time::timeout(timeout, sqlx::query("SELECT 1").execute(pool))
                    .await
                    .map(|r| r.map(|_| ()))
            }
            StorePool::Sqlite(pool) => {
                tokio::time::timeout(timeout, sqlx::query("SELECT 1").execute(pool))
                    .await
                    .map(|r| r.map(|_| ()))
            }
        };

        match result {
            Ok(Ok(_)) => Ok(started.elapsed()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err("timeout".to_string()),
        }
    }

    pub async fn close(&self) {
        match &self.pool {
            StorePool::Postgres(pool) => pool.close().await,
            StorePool::Sqlite(pool) => pool.close().await,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error("io error: {0}")]
    Io(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] migrate::MigrationError),
}
