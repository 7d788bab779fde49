use async_trait::async_trait;
use chrono::Utc;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::SessionStore;
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed session store
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the database file and run migrations
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Private in-memory database; a single connection keeps it alive.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteStorage {
    async fn save(&self, id: &str, payload: &[u8]) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO session_snapshots (id, payload, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(payload)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(session_id = %id, bytes = payload.len(), "Session snapshot saved");
        Ok(())
    }

    async fn load(&self, id: &str) -> StorageResult<Option<Vec<u8>>> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT payload
            FROM session_snapshots
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.payload))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM session_snapshots WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_ids(&self) -> StorageResult<Vec<String>> {
        let rows: Vec<IdRow> = sqlx::query_as(
            r#"
            SELECT id
            FROM session_snapshots
            ORDER BY updated_at DESC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.id).collect())
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct SnapshotRow {
    payload: Vec<u8>,
}

#[derive(sqlx::FromRow)]
struct IdRow {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_roundtrip_and_upsert() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        storage.save("s1", b"first").await.unwrap();
        storage.save("s1", b"second").await.unwrap();

        assert_eq!(storage.load("s1").await.unwrap().unwrap(), b"second");
        assert_eq!(storage.list_ids().await.unwrap(), vec!["s1"]);
    }

    #[tokio::test]
    async fn test_missing_and_delete() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        assert!(storage.load("nope").await.unwrap().is_none());
        storage.delete("nope").await.unwrap();

        storage.save("s1", b"x").await.unwrap();
        storage.delete("s1").await.unwrap();
        assert!(storage.load("s1").await.unwrap().is_none());
        assert!(storage.list_ids().await.unwrap().is_empty());
    }
}
