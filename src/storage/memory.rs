use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::SessionStore;
use crate::error::StorageResult;

/// Process-local store, used in tests and when no database is wanted.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, (Vec<u8>, DateTime<Utc>)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn save(&self, id: &str, payload: &[u8]) -> StorageResult<()> {
        self.entries
            .write()
            .await
            .insert(id.to_string(), (payload.to_vec(), Utc::now()));
        Ok(())
    }

    async fn load(&self, id: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .entries
            .read()
            .await
            .get(id)
            .map(|(payload, _)| payload.clone()))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.entries.write().await.remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> StorageResult<Vec<String>> {
        let entries = self.entries.read().await;
        let mut ids: Vec<(&String, &DateTime<Utc>)> =
            entries.iter().map(|(id, (_, saved))| (id, saved)).collect();
        ids.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        Ok(ids.into_iter().map(|(id, _)| id.clone()).collect())
    }
}
