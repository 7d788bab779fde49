//! Storage layer for interview session persistence.
//!
//! Sessions are stored as opaque serialized snapshots keyed by session id;
//! the session manager owns the encoding.

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStorage;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Persistence backend for session snapshots.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace the snapshot stored under `id`.
    async fn save(&self, id: &str, payload: &[u8]) -> StorageResult<()>;
    /// Load a snapshot, `None` if nothing is stored under `id`.
    async fn load(&self, id: &str) -> StorageResult<Option<Vec<u8>>>;
    /// Delete a snapshot. Deleting a missing id is not an error.
    async fn delete(&self, id: &str) -> StorageResult<()>;
    /// Ids of every stored snapshot, most recently saved first.
    async fn list_ids(&self) -> StorageResult<Vec<String>>;
}
