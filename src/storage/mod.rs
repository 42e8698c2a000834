pub mod repository;

use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::error::Result;

/// Default timeout for acquiring a connection from the pool.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for a single database operation.
pub(crate) const OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Database wraps a bounded SQLite connection pool. Migrations run on
/// connect; the unique project-mapping index is created separately by
/// [`Database::ensure_indexes`] so startup fails loudly when it cannot be
/// guaranteed.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the database at `url` (e.g. `sqlite:adosync.db?mode=rwc`)
    /// with at most `max_pool_size` connections.
    pub async fn connect(url: &str, max_pool_size: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .acquire_timeout(CONNECTION_TIMEOUT)
            .connect(url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Open an in-memory database (for testing). A single connection keeps
    /// every operation on the same in-memory instance.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Idempotently create the unique index on
    /// `project_mappings.ado_project_name`.
    pub async fn ensure_indexes(&self) -> Result<()> {
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_project_mappings_ado_project_name
             ON project_mappings (ado_project_name)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_creates_tables() {
        let db = Database::open_memory().await.unwrap();

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(db.pool())
                .await
                .unwrap();

        for expected in ["project_mappings", "task_mappings", "cache", "tags", "last_sync"] {
            assert!(
                tables.iter().any(|t| t == expected),
                "missing table {expected}, got {tables:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_ensure_indexes_idempotent() {
        let db = Database::open_memory().await.unwrap();
        db.ensure_indexes().await.unwrap();
        db.ensure_indexes().await.unwrap();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type='index' AND name='idx_project_mappings_ado_project_name'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(count, 1);
    }
}
