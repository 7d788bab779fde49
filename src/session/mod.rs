//! Session registry.
//!
//! Each session owns one [`TreeManager`] behind its own async mutex. A turn
//! holds that mutex for its whole duration, so turns within a session are
//! strictly sequential while different sessions proceed in parallel. The
//! registry lock is only held long enough to look up or swap handles.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TreeLimits;
use crate::error::{AppError, AppResult, SessionError, StorageError, ValidationError};
use crate::storage::SessionStore;
use crate::tree::{ConversationTree, TreeManager};
use crate::validation::{validate_session_id, MAX_METADATA_BYTES};

/// Mutable state of one interview session.
#[derive(Debug)]
pub struct SessionState {
    pub manager: TreeManager,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
    pub turn_count: usize,
    dirty: bool,
}

impl SessionState {
    fn new(manager: TreeManager, now: DateTime<Utc>, metadata: Option<serde_json::Value>) -> Self {
        Self {
            manager,
            created_at: now,
            last_access: now,
            metadata,
            turn_count: 0,
            dirty: true,
        }
    }

    /// Record a processed turn; the session will be picked up by the next save.
    pub fn record_turn(&mut self) {
        self.turn_count += 1;
        self.dirty = true;
    }

    /// Flag the session as changed since its last save.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn info(&self, id: &str) -> SessionInfo {
        SessionInfo {
            id: id.to_string(),
            created_at: self.created_at,
            last_access: self.last_access,
            node_count: self.manager.tree().len(),
            turn_count: self.turn_count,
            metadata: self.metadata.clone(),
        }
    }

    fn encode(&self) -> Result<Vec<u8>, StorageError> {
        let persisted = PersistedSession {
            tree: self.manager.tree().clone(),
            created_at: self.created_at,
            metadata: self.metadata.clone(),
            turn_count: self.turn_count,
        };
        serde_json::to_vec(&persisted).map_err(|e| StorageError::Encoding {
            message: e.to_string(),
        })
    }
}

/// Public view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub node_count: usize,
    pub turn_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Registry-wide memory counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub session_count: usize,
    pub total_nodes: usize,
    pub average_nodes_per_session: f64,
}

/// What goes into the store for one session.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedSession {
    pub tree: ConversationTree,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub turn_count: usize,
}

impl PersistedSession {
    pub(crate) fn decode(payload: &[u8]) -> Result<Self, StorageError> {
        serde_json::from_slice(payload).map_err(|e| StorageError::Encoding {
            message: e.to_string(),
        })
    }
}

type SessionHandle = Arc<Mutex<SessionState>>;

/// Registry of live interview sessions.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    limits: TreeLimits,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn SessionStore>>,
}

impl SessionManager {
    pub fn new(limits: TreeLimits) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            limits,
            clock: Arc::new(SystemClock),
            store: None,
        }
    }

    /// Use a custom clock for access times and expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Enable save/load against a store.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn limits(&self) -> TreeLimits {
        self.limits
    }

    pub fn store(&self) -> Option<&Arc<dyn SessionStore>> {
        self.store.as_ref()
    }

    /// Register a new session with an empty tree.
    ///
    /// A UUID is generated when `id` is `None`.
    pub async fn create_session(
        &self,
        id: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> AppResult<SessionInfo> {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        validate_session_id(&id)?;
        if let Some(metadata) = &metadata {
            let size = serde_json::to_vec(metadata)
                .map_err(|e| ValidationError::Malformed {
                    field: "metadata".to_string(),
                    reason: e.to_string(),
                })?
                .len();
            if size > MAX_METADATA_BYTES {
                return Err(ValidationError::TooLong {
                    field: "metadata".to_string(),
                    max: MAX_METADATA_BYTES,
                    actual: size,
                }
                .into());
            }
        }

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(SessionError::AlreadyExists { session_id: id }.into());
        }
        let state = SessionState::new(
            TreeManager::new(id.clone(), self.limits),
            self.clock.now(),
            metadata,
        );
        let info = state.info(&id);
        sessions.insert(id.clone(), Arc::new(Mutex::new(state)));

        info!(session_id = %id, "Session created");
        Ok(info)
    }

    async fn handle(&self, id: &str) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound {
                session_id: id.to_string(),
            })
    }

    /// Take exclusive access to a session for the duration of a turn.
    ///
    /// Refreshes the session's last access time.
    pub async fn lock_session(
        &self,
        id: &str,
    ) -> Result<OwnedMutexGuard<SessionState>, SessionError> {
        let handle = self.handle(id).await?;
        self.lock_registered(id, handle).await
    }

    /// Lock `handle`, failing if the session was evicted or replaced while
    /// waiting for it.
    async fn lock_registered(
        &self,
        id: &str,
        handle: SessionHandle,
    ) -> Result<OwnedMutexGuard<SessionState>, SessionError> {
        let mut guard = handle.clone().lock_owned().await;
        if !self.is_registered(id, &handle).await {
            debug!(session_id = %id, "Session left the registry while waiting for its lock");
            return Err(SessionError::NotFound {
                session_id: id.to_string(),
            });
        }
        guard.last_access = self.clock.now();
        Ok(guard)
    }

    async fn is_registered(&self, id: &str, handle: &SessionHandle) -> bool {
        self.sessions
            .read()
            .await
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    /// Whether a session is registered.
    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Copy of a session's tree.
    pub async fn get_session_tree(&self, id: &str) -> AppResult<ConversationTree> {
        let guard = self.lock_session(id).await?;
        Ok(guard.manager.tree().clone())
    }

    /// Replace a session's tree after validating it.
    pub async fn set_session_tree(&self, id: &str, tree: ConversationTree) -> AppResult<()> {
        if tree.session_id != id {
            return Err(ValidationError::Malformed {
                field: "tree".to_string(),
                reason: format!("tree belongs to session {}", tree.session_id),
            }
            .into());
        }
        let manager = TreeManager::from_tree(tree, self.limits)?;
        let mut guard = self.lock_session(id).await?;
        guard.manager = manager;
        guard.mark_dirty();
        debug!(session_id = %id, "Session tree replaced");
        Ok(())
    }

    /// Describe one session.
    pub async fn session_info(&self, id: &str) -> AppResult<SessionInfo> {
        let handle = self.handle(id).await?;
        let guard = handle.lock().await;
        Ok(guard.info(id))
    }

    /// Describe every live session, ordered by id.
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let handles: Vec<(String, SessionHandle)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, h)| (id.clone(), h.clone()))
            .collect();

        let mut infos = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            infos.push(handle.lock().await.info(&id));
        }
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Drop a session from the registry, waiting for any in-flight turn.
    pub async fn remove_session(&self, id: &str) -> AppResult<SessionInfo> {
        let handle = self.handle(id).await?;
        let guard = self.lock_registered(id, handle).await?;
        let info = guard.info(id);
        self.sessions.write().await.remove(id);
        drop(guard);
        info!(session_id = %id, "Session removed");
        Ok(info)
    }

    /// Evict sessions idle for longer than `max_age`.
    ///
    /// Sessions with a turn in flight are skipped. When a store is
    /// configured, evicted sessions with unsaved changes are saved first.
    pub async fn cleanup_expired_sessions(&self, max_age: Duration) -> usize {
        let now = self.clock.now();
        let mut pending_saves = Vec::new();

        let evicted = {
            let mut sessions = self.sessions.write().await;
            let mut expired = Vec::new();
            for (id, handle) in sessions.iter() {
                let Ok(state) = handle.try_lock() else {
                    debug!(session_id = %id, "Session busy, skipping expiry check");
                    continue;
                };
                let idle = (now - state.last_access).to_std().unwrap_or_default();
                if idle > max_age {
                    if self.store.is_some() && state.is_dirty() {
                        match state.encode() {
                            Ok(payload) => pending_saves.push((id.clone(), payload)),
                            Err(e) => warn!(
                                session_id = %id,
                                error = %e,
                                "Failed to encode expiring session"
                            ),
                        }
                    }
                    expired.push(id.clone());
                }
            }
            for id in &expired {
                sessions.remove(id);
            }
            expired.len()
        };

        if let Some(store) = &self.store {
            for (id, payload) in pending_saves {
                if let Err(e) = store.save(&id, &payload).await {
                    warn!(session_id = %id, error = %e, "Failed to save expiring session");
                }
            }
        }

        if evicted > 0 {
            info!(expired_count = evicted, "Cleaned up expired sessions");
        }
        evicted
    }

    /// Session and node counts.
    pub async fn memory_stats(&self) -> MemoryStats {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        let session_count = handles.len();
        let mut total_nodes = 0;
        for handle in handles {
            total_nodes += handle.lock().await.manager.tree().len();
        }
        MemoryStats {
            session_count,
            total_nodes,
            average_nodes_per_session: if session_count == 0 {
                0.0
            } else {
                total_nodes as f64 / session_count as f64
            },
        }
    }

    fn require_store(&self) -> Result<&Arc<dyn SessionStore>, SessionError> {
        self.store.as_ref().ok_or(SessionError::NoStore)
    }

    /// Persist one session.
    pub async fn save_session(&self, id: &str) -> AppResult<()> {
        let store = self.require_store()?;
        let handle = self.handle(id).await?;
        let payload = {
            let mut guard = handle.lock().await;
            let payload = guard.encode()?;
            guard.dirty = false;
            payload
        };
        if let Err(e) = store.save(id, &payload).await {
            handle.lock().await.mark_dirty();
            return Err(e.into());
        }
        debug!(session_id = %id, bytes = payload.len(), "Session saved");
        Ok(())
    }

    /// Load a persisted session into the registry.
    pub async fn load_session(&self, id: &str) -> AppResult<SessionInfo> {
        let store = self.require_store()?;
        if self.contains(id).await {
            return Err(SessionError::AlreadyExists {
                session_id: id.to_string(),
            }
            .into());
        }

        let payload = store
            .load(id)
            .await?
            .ok_or_else(|| StorageError::SessionNotFound {
                session_id: id.to_string(),
            })?;
        let persisted = PersistedSession::decode(&payload)?;
        let manager = TreeManager::from_tree(persisted.tree, self.limits)?;

        let mut state = SessionState::new(manager, persisted.created_at, persisted.metadata);
        state.last_access = self.clock.now();
        state.turn_count = persisted.turn_count;
        state.dirty = false;
        let info = state.info(id);

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(id) {
            return Err(SessionError::AlreadyExists {
                session_id: id.to_string(),
            }
            .into());
        }
        sessions.insert(id.to_string(), Arc::new(Mutex::new(state)));

        info!(session_id = %id, nodes = info.node_count, "Session loaded");
        Ok(info)
    }

    /// Drop a session from memory and delete its persisted snapshot.
    ///
    /// Succeeds when the session exists in either place.
    pub async fn forget_session(&self, id: &str) -> AppResult<()> {
        let store = self.require_store()?;
        let in_memory = match self.remove_session(id).await {
            Ok(_) => true,
            Err(AppError::Session(SessionError::NotFound { .. })) => false,
            Err(e) => return Err(e),
        };
        let persisted = store.load(id).await?.is_some();
        if !in_memory && !persisted {
            return Err(SessionError::NotFound {
                session_id: id.to_string(),
            }
            .into());
        }
        store.delete(id).await?;
        info!(session_id = %id, "Session forgotten");
        Ok(())
    }

    /// Save every session changed since its last save. Busy sessions are
    /// left for the next pass.
    pub async fn save_dirty_sessions(&self) -> AppResult<usize> {
        let store = self.require_store()?;
        let handles: Vec<(String, SessionHandle)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, h)| (id.clone(), h.clone()))
            .collect();

        let mut saved = 0;
        for (id, handle) in handles {
            let payload = {
                let Ok(mut state) = handle.try_lock() else {
                    continue;
                };
                if !state.is_dirty() {
                    continue;
                }
                let payload = state.encode()?;
                state.dirty = false;
                payload
            };
            if let Err(e) = store.save(&id, &payload).await {
                warn!(session_id = %id, error = %e, "Auto-save failed");
                handle.lock().await.mark_dirty();
                continue;
            }
            saved += 1;
        }

        if saved > 0 {
            debug!(saved, "Dirty sessions saved");
        }
        Ok(saved)
    }

    /// Periodically save dirty sessions until the task is aborted.
    pub fn spawn_auto_save(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        info!(interval_secs = interval.as_secs(), "Starting session auto-save");
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            timer.tick().await;

            loop {
                timer.tick().await;
                if let Err(e) = self.save_dirty_sessions().await {
                    warn!(error = %e, "Auto-save pass failed");
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
