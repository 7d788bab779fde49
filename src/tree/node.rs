use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Turn;

/// Visit and exhaustion bookkeeping for a topic node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Turns attached to this topic, in arrival order.
    pub turns: Vec<Turn>,
    /// How many times the cursor landed on this topic.
    pub visit_count: u32,
    /// When the cursor last landed on this topic.
    pub last_visited: Option<DateTime<Utc>>,
    /// Whether the topic has been covered enough.
    pub exhausted: bool,
    /// Whether the topic produced new sub-topics under high engagement.
    pub rich: bool,
}

/// A conversational topic in the interview tree.
///
/// Parent and children are id references into the owning
/// [`ConversationTree`](super::ConversationTree); structural changes go
/// through the tree so both sides of a link stay consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicNode {
    /// Unique node identifier.
    pub id: String,
    /// Topic name.
    pub label: String,
    /// Parent node ID (None for roots).
    pub parent_id: Option<String>,
    /// Child node IDs in discovery order.
    pub children: Vec<String>,
    /// 1 for roots, parent depth + 1 otherwise.
    pub depth: usize,
    /// Quality score (0.0-2.0), running mean over attached turns.
    pub score: Option<f64>,
    /// Creation order within the tree.
    pub seq: u64,
    /// When the node was created.
    pub created_at: DateTime<Utc>,
    /// When the node was last updated.
    pub updated_at: DateTime<Utc>,
    /// Visit, exhaustion and history metadata.
    pub metadata: NodeMetadata,
}

impl TopicNode {
    /// Create a detached root-level node
    pub fn new(label: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            label: label.into(),
            parent_id: None,
            children: Vec::new(),
            depth: 1,
            score: None,
            seq: 0,
            created_at: now,
            updated_at: now,
            metadata: NodeMetadata::default(),
        }
    }

    /// Set an explicit id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the initial score
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Whether this node has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Whether this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether the cursor has ever landed here.
    pub fn is_visited(&self) -> bool {
        self.metadata.visit_count > 0
    }

    /// Whether the node is still open for exploration.
    pub fn is_unexplored(&self) -> bool {
        !self.is_visited() && !self.metadata.exhausted
    }

    /// Record a cursor visit
    pub fn mark_visited(&mut self) {
        let now = Utc::now();
        self.metadata.visit_count += 1;
        self.metadata.last_visited = Some(now);
        self.updated_at = now;
    }

    /// Mark the topic as exhausted
    pub fn mark_exhausted(&mut self) {
        self.metadata.exhausted = true;
        self.updated_at = Utc::now();
    }

    /// Mark the topic as rich (it spawned sub-topics)
    pub fn mark_rich(&mut self) {
        self.metadata.rich = true;
        self.updated_at = Utc::now();
    }

    /// Replace the score
    pub fn update_score(&mut self, score: f64) {
        self.score = Some(score);
        self.updated_at = Utc::now();
    }

    /// Remove the score
    pub fn clear_score(&mut self) {
        self.score = None;
        self.updated_at = Utc::now();
    }

    /// Append a turn and fold its score into the node's running mean.
    pub fn attach_turn(&mut self, turn: Turn, score: f64) {
        let scored_turns = self.metadata.turns.len() as f64;
        let mean = match self.score {
            Some(existing) if scored_turns > 0.0 => {
                (existing * scored_turns + score) / (scored_turns + 1.0)
            }
            _ => score,
        };
        self.metadata.turns.push(turn);
        self.update_score(mean);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node_is_unvisited_root() {
        let node = TopicNode::new("Rust");
        assert!(node.is_root());
        assert!(node.is_leaf());
        assert_eq!(node.depth, 1);
        assert!(node.is_unexplored());
        assert!(node.score.is_none());
    }

    #[test]
    fn test_mark_visited_bumps_metadata() {
        let mut node = TopicNode::new("Rust");
        let before = node.updated_at;
        node.mark_visited();
        node.mark_visited();
        assert_eq!(node.metadata.visit_count, 2);
        assert!(node.metadata.last_visited.is_some());
        assert!(node.updated_at >= before);
        assert!(!node.is_unexplored());
    }

    #[test]
    fn test_exhausted_node_is_not_unexplored() {
        let mut node = TopicNode::new("Rust");
        node.mark_exhausted();
        assert!(node.metadata.exhausted);
        assert!(!node.is_unexplored());
    }

    #[test]
    fn test_attach_turn_keeps_running_mean() {
        let mut node = TopicNode::new("Rust");
        node.attach_turn(Turn::new("q1", "a1"), 2.0);
        assert_eq!(node.score, Some(2.0));
        node.attach_turn(Turn::new("q2", "a2"), 1.0);
        assert_eq!(node.score, Some(1.5));
        assert_eq!(node.metadata.turns.len(), 2);
    }

    #[test]
    fn test_clear_score() {
        let mut node = TopicNode::new("Rust").with_score(1.2);
        node.clear_score();
        assert!(node.score.is_none());
    }
}
