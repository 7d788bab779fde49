//! Public entry point: sessions plus the per-turn orchestrator.

mod summary;

pub use summary::{summarize, top_buzzwords, InterviewSummary, TopicCoverage, TOP_BUZZWORDS};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::analysis::TopicAnalyzer;
use crate::config::{CapabilityConfig, TreeLimits};
use crate::error::{AppResult, TreeIntegrityError};
use crate::orchestrator::{GradingOrchestrator, TurnOutcome};
use crate::scoring::ScoringStrategy;
use crate::session::{MemoryStats, SessionInfo, SessionManager};
use crate::tree::{ConversationTree, TopicNode, TreeStats, Turn};

/// Adaptive interview engine.
///
/// Every operation is keyed by session id. Operations on one session are
/// serialized by that session's lock; different sessions run independently.
pub struct InterviewEngine {
    sessions: Arc<SessionManager>,
    orchestrator: GradingOrchestrator,
}

impl InterviewEngine {
    pub fn new(sessions: Arc<SessionManager>, orchestrator: GradingOrchestrator) -> Self {
        Self {
            sessions,
            orchestrator,
        }
    }

    /// Engine using the in-process keyword analyzer and default grading policy.
    pub fn with_defaults(limits: TreeLimits, capabilities: CapabilityConfig) -> Self {
        Self::new(
            Arc::new(SessionManager::new(limits)),
            GradingOrchestrator::in_process(capabilities),
        )
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Start a new interview session.
    pub async fn create_session(
        &self,
        session_id: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> AppResult<SessionInfo> {
        self.sessions.create_session(session_id, metadata).await
    }

    /// Process one question/answer turn.
    pub async fn process_turn(&self, session_id: &str, turn: Turn) -> AppResult<TurnOutcome> {
        let mut session = self.sessions.lock_session(session_id).await?;
        let outcome = self
            .orchestrator
            .process_turn(&mut session.manager, turn)
            .await?;
        session.record_turn();
        Ok(outcome)
    }

    /// Copy of the session's tree.
    pub async fn get_tree(&self, session_id: &str) -> AppResult<ConversationTree> {
        self.sessions.get_session_tree(session_id).await
    }

    /// The unexplored node with the greatest depth, if any.
    pub async fn get_deepest_unvisited_branch(
        &self,
        session_id: &str,
    ) -> AppResult<Option<TopicNode>> {
        let session = self.sessions.lock_session(session_id).await?;
        Ok(session.manager.deepest_unvisited_branch().cloned())
    }

    /// Mark a node visited and make it the current topic.
    pub async fn mark_visited(&self, session_id: &str, node_id: &str) -> AppResult<TopicNode> {
        let mut session = self.sessions.lock_session(session_id).await?;
        session.manager.move_cursor_to(node_id)?;
        session.manager.mark_visited(node_id)?;
        session.mark_dirty();
        debug!(session_id = %session_id, node_id = %node_id, "Node marked visited");

        session
            .manager
            .tree()
            .node(node_id)
            .cloned()
            .ok_or_else(|| {
                TreeIntegrityError::NodeNotFound {
                    node_id: node_id.to_string(),
                }
                .into()
            })
    }

    /// Summary of the session so far.
    pub async fn get_summary(&self, session_id: &str) -> AppResult<InterviewSummary> {
        let session = self.sessions.lock_session(session_id).await?;
        Ok(summarize(session.manager.tree()))
    }

    /// Node counts for one session.
    pub async fn stats(&self, session_id: &str) -> AppResult<TreeStats> {
        let session = self.sessions.lock_session(session_id).await?;
        Ok(session.manager.stats())
    }

    /// End a session, returning its final summary.
    ///
    /// With a store configured the final tree is saved before the session
    /// leaves memory; a failed save keeps the session registered.
    pub async fn end_session(&self, session_id: &str) -> AppResult<InterviewSummary> {
        let summary = self.get_summary(session_id).await?;
        if self.sessions.store().is_some() {
            self.sessions.save_session(session_id).await?;
        }
        self.sessions.remove_session(session_id).await?;
        info!(
            session_id = %session_id,
            total_nodes = summary.total_nodes,
            turns = summary.turn_count,
            "Session ended"
        );
        Ok(summary)
    }

    /// Replace the scoring strategy for subsequent turns.
    pub fn set_scoring_strategy(&self, strategy: Arc<dyn ScoringStrategy>) {
        self.orchestrator.set_scoring_strategy(strategy);
    }

    /// Replace the topic analyzer for subsequent turns.
    pub fn set_topic_analyzer(&self, analyzer: Arc<dyn TopicAnalyzer>) {
        self.orchestrator.set_topic_analyzer(analyzer);
    }

    /// Evict sessions idle longer than `max_age`.
    pub async fn cleanup_expired_sessions(&self, max_age: Duration) -> usize {
        self.sessions.cleanup_expired_sessions(max_age).await
    }

    pub async fn memory_stats(&self) -> MemoryStats {
        self.sessions.memory_stats().await
    }

    /// Periodically evict idle sessions until the task is aborted.
    pub fn spawn_cleanup(
        self: Arc<Self>,
        interval: Duration,
        max_age: Duration,
    ) -> tokio::task::JoinHandle<()> {
        info!(
            interval_secs = interval.as_secs(),
            max_age_secs = max_age.as_secs(),
            "Starting session cleanup"
        );
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            timer.tick().await;

            loop {
                timer.tick().await;
                let evicted = self.cleanup_expired_sessions(max_age).await;
                if evicted > 0 {
                    let stats = self.memory_stats().await;
                    debug!(
                        evicted,
                        sessions = stats.session_count,
                        total_nodes = stats.total_nodes,
                        "Cleanup pass finished"
                    );
                }
            }
        })
    }
}

impl std::fmt::Debug for InterviewEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterviewEngine").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, SessionError};
    use crate::storage::{InMemoryStore, SessionStore};
    use crate::tree::EngagementLevel;

    fn engine() -> InterviewEngine {
        InterviewEngine::with_defaults(TreeLimits::default(), CapabilityConfig::default())
    }

    #[tokio::test]
    async fn test_turn_on_unknown_session() {
        let err = engine()
            .process_turn("ghost", Turn::new("q", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Session(SessionError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_process_turn_counts_turns() {
        let engine = engine();
        let info = engine.create_session(None, None).await.unwrap();
        engine
            .process_turn(
                &info.id,
                Turn::new("Tell me about Postgres", "Indexes, vacuum tuning and replication slots")
                    .with_engagement(EngagementLevel::Medium),
            )
            .await
            .unwrap();

        let info = engine.sessions().session_info(&info.id).await.unwrap();
        assert_eq!(info.turn_count, 1);
        assert_eq!(info.node_count, 1);
    }

    #[tokio::test]
    async fn test_mark_visited_moves_cursor() {
        let engine = engine();
        let info = engine.create_session(Some("s1".into()), None).await.unwrap();
        let node_id = {
            let mut session = engine.sessions().lock_session(&info.id).await.unwrap();
            let root = session.manager.add_node(TopicNode::new("Rust"), None).unwrap();
            session.manager.add_node(TopicNode::new("Async"), Some(&root)).unwrap()
        };

        let deepest = engine.get_deepest_unvisited_branch("s1").await.unwrap().unwrap();
        assert_eq!(deepest.id, node_id);

        let node = engine.mark_visited("s1", &node_id).await.unwrap();
        assert_eq!(node.metadata.visit_count, 1);
        let tree = engine.get_tree("s1").await.unwrap();
        assert_eq!(tree.current_node().unwrap().id, node_id);
        assert_eq!(tree.max_depth_reached, 1);

        assert!(engine.mark_visited("s1", "missing").await.is_err());
    }

    #[tokio::test]
    async fn test_end_session_saves_and_removes() {
        let store = Arc::new(InMemoryStore::new());
        let sessions = Arc::new(
            SessionManager::new(TreeLimits::default()).with_store(store.clone()),
        );
        let engine = InterviewEngine::new(
            sessions,
            GradingOrchestrator::in_process(CapabilityConfig::default()),
        );
        engine.create_session(Some("s1".into()), None).await.unwrap();
        engine
            .process_turn("s1", Turn::new("Kafka?", "Consumer groups and partition rebalancing"))
            .await
            .unwrap();

        let summary = engine.end_session("s1").await.unwrap();
        assert_eq!(summary.turn_count, 1);
        assert!(!engine.sessions().contains("s1").await);
        assert!(store.load("s1").await.unwrap().is_some());
    }
}
