use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use tracing::info;

use crate::types::{AppError, AppResult};

/// Database file created inside the configured store directory
pub const DATABASE_FILE: &str = "index.sqlite3";

/// Open (creating if needed) the embedded index database and apply migrations.
pub async fn create_pool(store_dir: &Path) -> AppResult<SqlitePool> {
    tokio::fs::create_dir_all(store_dir).await.map_err(|e| {
        AppError::VectorStore(format!("Failed to create {}: {}", store_dir.display(), e))
    })?;

    let options = SqliteConnectOptions::new()
        .filename(store_dir.join(DATABASE_FILE))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    info!("Running vector index migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| AppError::VectorStore(format!("Failed to run migrations: {}", e)))?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_pool_creates_database_file() {
        let dir = TempDir::new().unwrap();
        let store_dir = dir.path().join("nested").join("store");

        let pool = create_pool(&store_dir).await.unwrap();

        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await.unwrap();
        assert_eq!(one, 1);
        assert!(store_dir.join(DATABASE_FILE).exists());
    }
}
