use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ConversationTree, TopicNode};
use crate::config::TreeLimits;
use crate::error::{IntegrityResult, TreeIntegrityError};
use crate::validation;

/// Observability counters for one tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub root_count: usize,
    pub leaf_count: usize,
    pub max_depth: usize,
    pub visited_count: usize,
    pub exhausted_count: usize,
}

/// An exact copy of a tree taken before a mutation, used for rollback.
#[derive(Debug, Clone)]
pub struct TreeSnapshot(ConversationTree);

/// Owns one conversation tree and keeps it structurally valid.
///
/// Every mutating operation re-validates integrity afterwards and undoes
/// itself when the check fails, so callers only ever observe valid trees.
#[derive(Debug, Clone)]
pub struct TreeManager {
    tree: ConversationTree,
    limits: TreeLimits,
}

impl TreeManager {
    /// Create a manager over an empty tree
    pub fn new(session_id: impl Into<String>, limits: TreeLimits) -> Self {
        Self {
            tree: ConversationTree::new(session_id),
            limits,
        }
    }

    /// Adopt an existing tree after validating it
    pub fn from_tree(tree: ConversationTree, limits: TreeLimits) -> IntegrityResult<Self> {
        let manager = Self { tree, limits };
        manager.verify()?;
        Ok(manager)
    }

    /// The managed tree.
    pub fn tree(&self) -> &ConversationTree {
        &self.tree
    }

    /// Structural ceilings in force.
    pub fn limits(&self) -> TreeLimits {
        self.limits
    }

    /// Give up ownership of the tree.
    pub fn into_tree(self) -> ConversationTree {
        self.tree
    }

    /// Run every integrity and ceiling check.
    pub fn verify(&self) -> IntegrityResult<()> {
        validation::validate_tree_integrity(&self.tree)?;
        validation::validate_tree_size(&self.tree, self.limits.max_nodes)?;
        validation::validate_tree_depth(&self.tree, self.limits.max_depth)
    }

    /// Whether one more node fits under the size ceiling.
    pub fn has_capacity(&self) -> bool {
        self.tree.len() < self.limits.max_nodes
    }

    /// Depth a new child of `parent_id` would land at, if the parent exists.
    pub fn child_depth(&self, parent_id: &str) -> Option<usize> {
        self.tree.node(parent_id).map(|p| p.depth + 1)
    }

    /// Add a node under `parent_id`, or as a new root when `None`.
    ///
    /// Ceilings are checked up front; if the post-mutation integrity check
    /// fails, the node is removed again and the error returned.
    pub fn add_node(
        &mut self,
        node: TopicNode,
        parent_id: Option<&str>,
    ) -> IntegrityResult<String> {
        validation::validate_label(&node.label).map_err(|e| TreeIntegrityError::InvalidNode {
            node_id: node.id.clone(),
            reason: e.to_string(),
        })?;

        if !self.has_capacity() {
            return Err(TreeIntegrityError::SizeCeilingExceeded {
                count: self.tree.len() + 1,
                max: self.limits.max_nodes,
            });
        }

        let id = match parent_id {
            Some(parent_id) => {
                let depth = self.child_depth(parent_id).ok_or_else(|| {
                    TreeIntegrityError::NodeNotFound {
                        node_id: parent_id.to_string(),
                    }
                })?;
                if depth > self.limits.max_depth {
                    return Err(TreeIntegrityError::DepthCeilingExceeded {
                        depth,
                        max: self.limits.max_depth,
                    });
                }
                self.tree.insert_child(parent_id, node)?
            }
            None => self.tree.insert_root(node)?,
        };

        if let Err(e) = self.verify() {
            warn!(node_id = %id, error = %e, "Post-insert integrity check failed, removing node");
            self.tree.remove_subtree(&id)?;
            return Err(e);
        }

        debug!(
            session_id = %self.tree.session_id,
            node_id = %id,
            parent_id = ?parent_id,
            "Topic node added"
        );
        Ok(id)
    }

    /// Apply a non-structural edit to a node.
    ///
    /// Structural fields (id, parent, children, depth, seq) are restored after
    /// the edit; use [`reparent_node`](Self::reparent_node) to move nodes.
    pub fn update_node<F>(&mut self, id: &str, edit: F) -> IntegrityResult<()>
    where
        F: FnOnce(&mut TopicNode),
    {
        let node = self
            .tree
            .node_mut(id)
            .ok_or_else(|| TreeIntegrityError::NodeNotFound {
                node_id: id.to_string(),
            })?;
        let before = node.clone();
        edit(node);
        node.id = before.id.clone();
        node.parent_id = before.parent_id.clone();
        node.children = before.children.clone();
        node.depth = before.depth;
        node.seq = before.seq;
        node.updated_at = chrono::Utc::now();

        let label_ok = validation::validate_label(&node.label).is_ok();
        let score_ok = node
            .score
            .map_or(true, |s| validation::validate_score(s).is_ok());
        if !label_ok || !score_ok {
            *node = before;
            return Err(TreeIntegrityError::InvalidNode {
                node_id: id.to_string(),
                reason: "edit produced an invalid label or score".to_string(),
            });
        }

        if let Err(e) = self.verify() {
            if let Some(node) = self.tree.node_mut(id) {
                *node = before;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Remove a node and its subtree, truncating the cursor if needed.
    pub fn remove_node(&mut self, id: &str) -> IntegrityResult<Vec<TopicNode>> {
        let snapshot = self.snapshot();
        let removed = self.tree.remove_subtree(id)?;
        if let Err(e) = self.verify() {
            self.restore(snapshot);
            return Err(e);
        }
        debug!(node_id = %id, removed = removed.len(), "Topic subtree removed");
        Ok(removed)
    }

    /// Move a node under a new parent (or make it a root).
    pub fn reparent_node(&mut self, id: &str, new_parent: Option<&str>) -> IntegrityResult<()> {
        let snapshot = self.snapshot();
        self.tree.set_parent(id, new_parent)?;
        if let Err(e) = self.verify() {
            self.restore(snapshot);
            return Err(e);
        }
        Ok(())
    }

    /// Depth of a node recomputed from parent links.
    pub fn depth_from_root(&self, id: &str) -> IntegrityResult<usize> {
        self.tree.calculate_depth_from_root(id)
    }

    /// The active node (last id of the cursor), if any.
    pub fn current_topic(&self) -> Option<&TopicNode> {
        self.tree.current_node()
    }

    /// The cursor path.
    pub fn current_path(&self) -> &[String] {
        self.tree.current_path()
    }

    /// Replace the cursor path after validating it.
    pub fn set_current_path(&mut self, path: Vec<String>) -> IntegrityResult<()> {
        self.tree.set_current_path(path)
    }

    /// Point the cursor at `id` and record the depth reached.
    pub fn move_cursor_to(&mut self, id: &str) -> IntegrityResult<()> {
        let path = self.tree.path_to(id)?;
        self.tree.set_current_path(path)?;
        self.record_depth_reached(id);
        Ok(())
    }

    /// Record a visit on a node.
    pub fn mark_visited(&mut self, id: &str) -> IntegrityResult<()> {
        self.tree
            .node_mut(id)
            .ok_or_else(|| TreeIntegrityError::NodeNotFound {
                node_id: id.to_string(),
            })?
            .mark_visited();
        Ok(())
    }

    /// Mark a node exhausted and append its label to the exhausted record.
    ///
    /// Roots are never exhausted; returns whether the node changed state.
    pub fn mark_exhausted(&mut self, id: &str) -> IntegrityResult<bool> {
        let node = self
            .tree
            .node_mut(id)
            .ok_or_else(|| TreeIntegrityError::NodeNotFound {
                node_id: id.to_string(),
            })?;
        if node.is_root() || node.metadata.exhausted {
            return Ok(false);
        }
        node.mark_exhausted();
        let label = node.label.clone();
        self.tree.exhausted_topics.push(label);
        Ok(true)
    }

    /// Mark a node rich.
    pub fn mark_rich(&mut self, id: &str) -> IntegrityResult<()> {
        self.tree
            .node_mut(id)
            .ok_or_else(|| TreeIntegrityError::NodeNotFound {
                node_id: id.to_string(),
            })?
            .mark_rich();
        Ok(())
    }

    /// Attach a turn to a node and fold its score into the node's mean.
    pub fn attach_turn(
        &mut self,
        id: &str,
        turn: super::Turn,
        score: f64,
    ) -> IntegrityResult<()> {
        self.tree
            .node_mut(id)
            .ok_or_else(|| TreeIntegrityError::NodeNotFound {
                node_id: id.to_string(),
            })?
            .attach_turn(turn, score);
        Ok(())
    }

    /// Raise `max_depth_reached` to the level of `id` below its root.
    pub fn record_depth_reached(&mut self, id: &str) {
        if let Some(node) = self.tree.node(id) {
            let level = node.depth.saturating_sub(1);
            if level > self.tree.max_depth_reached {
                self.tree.max_depth_reached = level;
            }
        }
    }

    /// Find a direct child of `parent_id` by label (case-insensitive).
    pub fn find_child_by_label(&self, parent_id: &str, label: &str) -> Option<&TopicNode> {
        self.tree.node(parent_id).and_then(|parent| {
            parent
                .children
                .iter()
                .filter_map(|c| self.tree.node(c))
                .find(|c| c.label.eq_ignore_ascii_case(label))
        })
    }

    /// Find any node by label (case-insensitive), earliest created first.
    pub fn find_by_label(&self, label: &str) -> Option<&TopicNode> {
        self.tree
            .nodes()
            .filter(|n| n.label.eq_ignore_ascii_case(label))
            .min_by_key(|n| n.seq)
    }

    /// The unexplored node with the greatest depth, ties broken by earliest creation.
    pub fn deepest_unvisited_branch(&self) -> Option<&TopicNode> {
        self.tree
            .nodes()
            .filter(|n| n.is_unexplored())
            .min_by(|a, b| b.depth.cmp(&a.depth).then(a.seq.cmp(&b.seq)))
    }

    /// Siblings of a node (same parent, or the other roots), in discovery order.
    pub fn siblings(&self, id: &str) -> Vec<&TopicNode> {
        let ids: &[String] = match self.tree.node(id).and_then(|n| n.parent_id.as_deref()) {
            Some(parent_id) => self
                .tree
                .node(parent_id)
                .map(|p| p.children.as_slice())
                .unwrap_or(&[]),
            None => self.tree.root_ids(),
        };
        ids.iter()
            .filter(|s| s.as_str() != id)
            .filter_map(|s| self.tree.node(s))
            .collect()
    }

    /// Direct children of a node, in discovery order.
    pub fn children(&self, id: &str) -> Vec<&TopicNode> {
        self.tree
            .node(id)
            .map(|n| n.children.iter().filter_map(|c| self.tree.node(c)).collect())
            .unwrap_or_default()
    }

    /// Node counts and depth.
    pub fn stats(&self) -> TreeStats {
        let nodes = || self.tree.nodes();
        TreeStats {
            total_nodes: self.tree.len(),
            root_count: self.tree.root_ids().len(),
            leaf_count: nodes().filter(|n| n.is_leaf()).count(),
            max_depth: self.tree.max_depth(),
            visited_count: nodes().filter(|n| n.is_visited()).count(),
            exhausted_count: nodes().filter(|n| n.metadata.exhausted).count(),
        }
    }

    /// Capture the whole tree for an exact rollback.
    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot(self.tree.clone())
    }

    /// Put back a previously captured tree.
    pub fn restore(&mut self, snapshot: TreeSnapshot) {
        self.tree = snapshot.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Turn;

    fn limits(max_depth: usize, max_nodes: usize) -> TreeLimits {
        TreeLimits {
            max_depth,
            max_nodes,
            min_attach_confidence: 0.5,
        }
    }

    fn manager() -> TreeManager {
        TreeManager::new("s1", TreeLimits::default())
    }

    #[test]
    fn test_add_node_root_and_child() {
        let mut mgr = manager();
        let root = mgr.add_node(TopicNode::new("Interview"), None).unwrap();
        let child = mgr.add_node(TopicNode::new("React"), Some(&root)).unwrap();
        assert_eq!(mgr.depth_from_root(&child).unwrap(), 2);
        assert_eq!(mgr.tree().node(&child).unwrap().depth, 2);
        assert!(mgr.verify().is_ok());
    }

    #[test]
    fn test_add_node_missing_parent() {
        let mut mgr = manager();
        let err = mgr
            .add_node(TopicNode::new("orphan"), Some("missing"))
            .unwrap_err();
        assert!(matches!(err, TreeIntegrityError::NodeNotFound { .. }));
        assert!(mgr.tree().is_empty());
    }

    #[test]
    fn test_add_node_enforces_ceilings() {
        let mut mgr = TreeManager::new("s1", limits(2, 3));
        let root = mgr.add_node(TopicNode::new("r"), None).unwrap();
        let child = mgr.add_node(TopicNode::new("c"), Some(&root)).unwrap();
        let err = mgr.add_node(TopicNode::new("gc"), Some(&child)).unwrap_err();
        assert!(matches!(err, TreeIntegrityError::DepthCeilingExceeded { depth: 3, max: 2 }));

        mgr.add_node(TopicNode::new("r2"), None).unwrap();
        let err = mgr.add_node(TopicNode::new("r3"), None).unwrap_err();
        assert!(matches!(err, TreeIntegrityError::SizeCeilingExceeded { .. }));
        assert_eq!(mgr.tree().len(), 3);
    }

    #[test]
    fn test_add_node_rejects_duplicate_id() {
        let mut mgr = manager();
        mgr.add_node(TopicNode::new("a").with_id("same"), None).unwrap();
        let err = mgr
            .add_node(TopicNode::new("b").with_id("same"), None)
            .unwrap_err();
        assert!(matches!(err, TreeIntegrityError::DuplicateNode { .. }));
        assert_eq!(mgr.tree().len(), 1);
    }

    #[test]
    fn test_update_node_keeps_structure() {
        let mut mgr = manager();
        let root = mgr.add_node(TopicNode::new("r"), None).unwrap();
        let child = mgr.add_node(TopicNode::new("c"), Some(&root)).unwrap();
        mgr.update_node(&child, |n| {
            n.label = "renamed".to_string();
            n.depth = 99;
            n.parent_id = None;
        })
        .unwrap();
        let node = mgr.tree().node(&child).unwrap();
        assert_eq!(node.label, "renamed");
        assert_eq!(node.depth, 2);
        assert_eq!(node.parent_id.as_deref(), Some(root.as_str()));
    }

    #[test]
    fn test_update_node_rejects_bad_score() {
        let mut mgr = manager();
        let root = mgr.add_node(TopicNode::new("r"), None).unwrap();
        assert!(mgr.update_node(&root, |n| n.score = Some(5.0)).is_err());
        assert!(mgr.tree().node(&root).unwrap().score.is_none());
    }

    #[test]
    fn test_remove_node_truncates_cursor() {
        let mut mgr = manager();
        let root = mgr.add_node(TopicNode::new("r"), None).unwrap();
        let child = mgr.add_node(TopicNode::new("c"), Some(&root)).unwrap();
        mgr.move_cursor_to(&child).unwrap();
        mgr.remove_node(&child).unwrap();
        assert_eq!(mgr.current_path(), &[root.clone()]);
        assert_eq!(mgr.current_topic().unwrap().id, root);
    }

    #[test]
    fn test_reparent_rejects_cycle_and_keeps_tree() {
        let mut mgr = manager();
        let root = mgr.add_node(TopicNode::new("r"), None).unwrap();
        let a = mgr.add_node(TopicNode::new("a"), Some(&root)).unwrap();
        let b = mgr.add_node(TopicNode::new("b"), Some(&a)).unwrap();
        let before = mgr.tree().clone();
        assert!(mgr.reparent_node(&root, Some(&b)).is_err());
        assert_eq!(mgr.tree(), &before);
    }

    #[test]
    fn test_reparent_respects_depth_ceiling() {
        let mut mgr = TreeManager::new("s1", limits(3, 100));
        let r1 = mgr.add_node(TopicNode::new("r1"), None).unwrap();
        let a = mgr.add_node(TopicNode::new("a"), Some(&r1)).unwrap();
        let _b = mgr.add_node(TopicNode::new("b"), Some(&a)).unwrap();
        let r2 = mgr.add_node(TopicNode::new("r2"), None).unwrap();
        let c = mgr.add_node(TopicNode::new("c"), Some(&r2)).unwrap();
        let before = mgr.tree().clone();
        let err = mgr.reparent_node(&a, Some(&c)).unwrap_err();
        assert!(matches!(err, TreeIntegrityError::DepthCeilingExceeded { .. }));
        assert_eq!(mgr.tree(), &before);
    }

    #[test]
    fn test_move_cursor_records_depth_reached() {
        let mut mgr = manager();
        let root = mgr.add_node(TopicNode::new("r"), None).unwrap();
        let a = mgr.add_node(TopicNode::new("a"), Some(&root)).unwrap();
        let b = mgr.add_node(TopicNode::new("b"), Some(&a)).unwrap();
        mgr.move_cursor_to(&b).unwrap();
        assert_eq!(mgr.current_path().len(), 3);
        assert_eq!(mgr.tree().max_depth_reached, 2);
        mgr.move_cursor_to(&root).unwrap();
        assert_eq!(mgr.tree().max_depth_reached, 2);
    }

    #[test]
    fn test_mark_exhausted_skips_roots_and_repeats() {
        let mut mgr = manager();
        let root = mgr.add_node(TopicNode::new("r"), None).unwrap();
        let a = mgr.add_node(TopicNode::new("a"), Some(&root)).unwrap();
        assert!(!mgr.mark_exhausted(&root).unwrap());
        assert!(mgr.mark_exhausted(&a).unwrap());
        assert!(!mgr.mark_exhausted(&a).unwrap());
        assert_eq!(mgr.tree().exhausted_topics, vec!["a".to_string()]);
    }

    #[test]
    fn test_deepest_unvisited_branch_prefers_depth_then_age() {
        let mut mgr = manager();
        let root = mgr.add_node(TopicNode::new("r"), None).unwrap();
        let a = mgr.add_node(TopicNode::new("a"), Some(&root)).unwrap();
        let b = mgr.add_node(TopicNode::new("b"), Some(&root)).unwrap();
        let a1 = mgr.add_node(TopicNode::new("a1"), Some(&a)).unwrap();
        let b1 = mgr.add_node(TopicNode::new("b1"), Some(&b)).unwrap();
        assert_eq!(mgr.deepest_unvisited_branch().unwrap().id, a1);

        mgr.mark_visited(&a1).unwrap();
        assert_eq!(mgr.deepest_unvisited_branch().unwrap().id, b1);

        mgr.mark_exhausted(&b1).unwrap();
        assert_eq!(mgr.deepest_unvisited_branch().unwrap().id, a);
    }

    #[test]
    fn test_deepest_unvisited_branch_empty() {
        assert!(manager().deepest_unvisited_branch().is_none());
    }

    #[test]
    fn test_siblings_and_children() {
        let mut mgr = manager();
        let root = mgr.add_node(TopicNode::new("r"), None).unwrap();
        let a = mgr.add_node(TopicNode::new("a"), Some(&root)).unwrap();
        let b = mgr.add_node(TopicNode::new("b"), Some(&root)).unwrap();
        let sibs: Vec<&str> = mgr.siblings(&a).iter().map(|n| n.id.as_str()).collect();
        assert_eq!(sibs, vec![b.as_str()]);
        assert_eq!(mgr.children(&root).len(), 2);
        assert!(mgr.find_child_by_label(&root, "A").is_some());
        assert_eq!(mgr.find_by_label("b").unwrap().id, b);
    }

    #[test]
    fn test_stats() {
        let mut mgr = manager();
        let root = mgr.add_node(TopicNode::new("r"), None).unwrap();
        let a = mgr.add_node(TopicNode::new("a"), Some(&root)).unwrap();
        mgr.add_node(TopicNode::new("b"), Some(&root)).unwrap();
        mgr.add_node(TopicNode::new("r2"), None).unwrap();
        mgr.mark_visited(&root).unwrap();
        mgr.mark_exhausted(&a).unwrap();

        let stats = mgr.stats();
        assert_eq!(stats.total_nodes, 4);
        assert_eq!(stats.root_count, 2);
        assert_eq!(stats.leaf_count, 3);
        assert_eq!(stats.max_depth, 2);
        assert_eq!(stats.visited_count, 1);
        assert_eq!(stats.exhausted_count, 1);
    }

    #[test]
    fn test_snapshot_restore_is_exact() {
        let mut mgr = manager();
        let root = mgr.add_node(TopicNode::new("r"), None).unwrap();
        let snapshot = mgr.snapshot();
        let before = mgr.tree().clone();

        let a = mgr.add_node(TopicNode::new("a"), Some(&root)).unwrap();
        mgr.attach_turn(&a, Turn::new("q", "a"), 1.0).unwrap();
        mgr.move_cursor_to(&a).unwrap();
        mgr.restore(snapshot);

        assert_eq!(mgr.tree(), &before);
    }

    #[test]
    fn test_from_tree_validates() {
        let mut mgr = manager();
        let root = mgr.add_node(TopicNode::new("r"), None).unwrap();
        let mut tree = mgr.into_tree();
        tree.node_mut(&root).unwrap().depth = 4;
        assert!(TreeManager::from_tree(tree, TreeLimits::default()).is_err());
    }
}
