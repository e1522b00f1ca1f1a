//! Database connection for xbot
//!
//! `Database` owns the SQLite pool and runs the embedded migrations. The
//! ledger, creative and account stores implement their traits on top of it
//! (see `ledger.rs`, `creatives.rs`, `accounts.rs`).

use sqlx::sqlite::SqlitePool;
use std::path::Path;

use crate::error::{DbError, Result, XbotError};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // mode=rwc creates the file on first use
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        tracing::debug!(path = %expanded_path, "database ready");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cheap connectivity probe for health checks.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }
}

/// Map a sqlx error, turning UNIQUE violations into `AlreadyExists`.
pub(crate) fn map_insert_error(err: sqlx::Error, what: impl FnOnce() -> String) -> XbotError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return XbotError::AlreadyExists(what());
        }
    }
    DbError::SqlxError(err).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_database_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("dir").join("xbot.db");

        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        db.ping().await.unwrap();

        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("xbot.db");
        let path = db_path.to_str().unwrap();

        Database::new(path).await.unwrap();
        // Reopening runs the migrator again against an up-to-date schema
        Database::new(path).await.unwrap();
    }

    #[tokio::test]
    async fn test_database_initialization_with_invalid_path() {
        #[cfg(unix)]
        let invalid_path = "/tmp/xbot\0invalid.db";

        #[cfg(windows)]
        let invalid_path = "C:\\invalid<>path\\xbot.db";

        let result = Database::new(invalid_path).await;
        assert!(result.is_err(), "Expected error for invalid path");
    }
}
