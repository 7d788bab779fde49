//! Topic tree data model.
//!
//! The tree is an arena: nodes live in a flat map keyed by id, and parent and
//! child links are id references. Structural operations that touch both ends
//! of a link are methods on [`ConversationTree`]; per-node bookkeeping lives on
//! [`TopicNode`].
//!
//! - [`TopicNode`]: one topic, its turns and its visit/exhaustion metadata
//! - [`ConversationTree`]: the owning aggregate with roots and the cursor path
//! - [`TreeManager`]: validated CRUD, navigation and statistics over one tree

mod manager;
mod node;
mod render;
mod turn;

pub use manager::*;
pub use node::*;
pub use render::*;
pub use turn::*;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IntegrityResult, TreeIntegrityError};

/// The topic tree of one interview session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTree {
    /// Owning session ID.
    pub session_id: String,
    /// When the tree was created.
    pub created_at: DateTime<Utc>,
    pub(crate) nodes: HashMap<String, TopicNode>,
    pub(crate) root_ids: Vec<String>,
    pub(crate) current_path: Vec<String>,
    /// Deepest level descended below a root (roots are level 0).
    pub max_depth_reached: usize,
    /// Labels of topics marked exhausted, in the order they were exhausted.
    pub exhausted_topics: Vec<String>,
    next_seq: u64,
}

impl ConversationTree {
    /// Create an empty tree for a session
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            created_at: Utc::now(),
            nodes: HashMap::new(),
            root_ids: Vec::new(),
            current_path: Vec::new(),
            max_depth_reached: 0,
            exhausted_topics: Vec::new(),
            next_seq: 0,
        }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node.
    pub fn node(&self, id: &str) -> Option<&TopicNode> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut TopicNode> {
        self.nodes.get_mut(id)
    }

    /// Whether a node exists.
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Iterate over all nodes in arbitrary order.
    pub fn nodes(&self) -> impl Iterator<Item = &TopicNode> {
        self.nodes.values()
    }

    /// Root node IDs in creation order.
    pub fn root_ids(&self) -> &[String] {
        &self.root_ids
    }

    /// The cursor: node IDs from a root to the active node.
    pub fn current_path(&self) -> &[String] {
        &self.current_path
    }

    /// The active node, if any.
    pub fn current_node(&self) -> Option<&TopicNode> {
        self.current_path.last().and_then(|id| self.nodes.get(id))
    }

    /// Greatest cached depth over all nodes (0 for an empty tree).
    pub fn max_depth(&self) -> usize {
        self.nodes.values().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Nodes in display order: roots in creation order, children in discovery order.
    pub fn preorder(&self) -> Vec<&TopicNode> {
        let mut ordered = Vec::with_capacity(self.nodes.len());
        let mut seen = HashSet::new();
        let mut stack: Vec<&String> = self.root_ids.iter().rev().collect();
        while let Some(id) = stack.pop() {
            if !seen.insert(id.as_str()) {
                continue;
            }
            if let Some(node) = self.nodes.get(id) {
                ordered.push(node);
                stack.extend(node.children.iter().rev());
            }
        }
        ordered
    }

    /// Every attached turn across the tree, oldest first.
    pub fn turn_history(&self) -> Vec<crate::tree::Turn> {
        let mut turns: Vec<_> = self
            .nodes
            .values()
            .flat_map(|n| n.metadata.turns.iter().cloned())
            .collect();
        turns.sort_by_key(|t| t.timestamp);
        turns
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Insert a node as a new root.
    pub(crate) fn insert_root(&mut self, mut node: TopicNode) -> IntegrityResult<String> {
        if self.nodes.contains_key(&node.id) {
            return Err(TreeIntegrityError::DuplicateNode { node_id: node.id });
        }
        node.parent_id = None;
        node.children.clear();
        node.depth = 1;
        node.seq = self.take_seq();
        let id = node.id.clone();
        self.root_ids.push(id.clone());
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Insert a node as the last child of `parent_id`.
    pub(crate) fn insert_child(
        &mut self,
        parent_id: &str,
        mut node: TopicNode,
    ) -> IntegrityResult<String> {
        if self.nodes.contains_key(&node.id) {
            return Err(TreeIntegrityError::DuplicateNode { node_id: node.id });
        }
        let parent_depth = self
            .nodes
            .get(parent_id)
            .map(|p| p.depth)
            .ok_or_else(|| TreeIntegrityError::NodeNotFound {
                node_id: parent_id.to_string(),
            })?;

        node.parent_id = Some(parent_id.to_string());
        node.children.clear();
        node.depth = parent_depth + 1;
        node.seq = self.take_seq();
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.children.push(id.clone());
            parent.updated_at = Utc::now();
        }
        Ok(id)
    }

    /// Attach `child_id` under `parent_id`, moving it from wherever it was.
    pub fn add_child(&mut self, parent_id: &str, child_id: &str) -> IntegrityResult<()> {
        self.set_parent(child_id, Some(parent_id))
    }

    /// Detach `child_id` from `parent_id`, turning it into a root.
    pub fn remove_child(&mut self, parent_id: &str, child_id: &str) -> IntegrityResult<()> {
        let child = self
            .nodes
            .get(child_id)
            .ok_or_else(|| TreeIntegrityError::NodeNotFound {
                node_id: child_id.to_string(),
            })?;
        if child.parent_id.as_deref() != Some(parent_id) {
            return Err(TreeIntegrityError::LinkMismatch {
                parent_id: parent_id.to_string(),
                child_id: child_id.to_string(),
            });
        }
        self.set_parent(child_id, None)
    }

    /// Re-parent a node (None makes it a root) and cascade the new depth.
    ///
    /// Rejects self-parenting and any parent that is a descendant of the node.
    pub fn set_parent(&mut self, node_id: &str, new_parent: Option<&str>) -> IntegrityResult<()> {
        if !self.nodes.contains_key(node_id) {
            return Err(TreeIntegrityError::NodeNotFound {
                node_id: node_id.to_string(),
            });
        }

        let new_depth = match new_parent {
            Some(parent_id) => {
                if parent_id == node_id {
                    return Err(TreeIntegrityError::SelfParent {
                        node_id: node_id.to_string(),
                    });
                }
                let parent =
                    self.nodes
                        .get(parent_id)
                        .ok_or_else(|| TreeIntegrityError::NodeNotFound {
                            node_id: parent_id.to_string(),
                        })?;
                if self.find_descendant(node_id, parent_id).is_some() {
                    return Err(TreeIntegrityError::CycleDetected {
                        node_id: node_id.to_string(),
                        parent_id: parent_id.to_string(),
                    });
                }
                parent.depth + 1
            }
            None => 1,
        };

        let old_parent = self.nodes.get(node_id).and_then(|n| n.parent_id.clone());
        match &old_parent {
            Some(old) => {
                if let Some(parent) = self.nodes.get_mut(old) {
                    parent.children.retain(|c| c != node_id);
                    parent.updated_at = Utc::now();
                }
            }
            None => self.root_ids.retain(|r| r != node_id),
        }

        match new_parent {
            Some(parent_id) => {
                if let Some(parent) = self.nodes.get_mut(parent_id) {
                    parent.children.push(node_id.to_string());
                    parent.updated_at = Utc::now();
                }
            }
            None => self.root_ids.push(node_id.to_string()),
        }

        if let Some(node) = self.nodes.get_mut(node_id) {
            node.parent_id = new_parent.map(str::to_string);
            node.depth = new_depth;
            node.updated_at = Utc::now();
        }
        self.cascade_depth(node_id);

        // A cursor running through the moved node no longer forms a chain.
        if let Some(pos) = self.current_path.iter().position(|id| id == node_id) {
            let mut path = self.path_to(node_id)?;
            path.extend(self.current_path[pos + 1..].iter().cloned());
            self.current_path = path;
        }
        Ok(())
    }

    /// Propagate depth from `id` to all of its descendants.
    fn cascade_depth(&mut self, id: &str) {
        let mut stack = vec![id.to_string()];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let (depth, children) = match self.nodes.get(&current) {
                Some(node) => (node.depth, node.children.clone()),
                None => continue,
            };
            for child_id in children {
                if let Some(child) = self.nodes.get_mut(&child_id) {
                    if child.depth != depth + 1 {
                        child.depth = depth + 1;
                        child.updated_at = Utc::now();
                    }
                    stack.push(child_id);
                }
            }
        }
    }

    /// All descendants of a node in preorder (the node itself excluded).
    pub fn all_descendants(&self, id: &str) -> Vec<&TopicNode> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<&String> = match self.nodes.get(id) {
            Some(node) => node.children.iter().rev().collect(),
            None => return out,
        };
        while let Some(child_id) = stack.pop() {
            if !seen.insert(child_id.as_str()) {
                continue;
            }
            if let Some(child) = self.nodes.get(child_id) {
                out.push(child);
                stack.extend(child.children.iter().rev());
            }
        }
        out
    }

    /// Find `target_id` among the descendants of `id`.
    pub fn find_descendant(&self, id: &str, target_id: &str) -> Option<&TopicNode> {
        self.all_descendants(id)
            .into_iter()
            .find(|n| n.id == target_id)
    }

    /// Recompute a node's depth by walking parent links, ignoring cached depths.
    pub fn calculate_depth_from_root(&self, id: &str) -> IntegrityResult<usize> {
        Ok(self.path_to(id)?.len())
    }

    /// Root-to-node chain of ids ending at `id`.
    pub fn path_to(&self, id: &str) -> IntegrityResult<Vec<String>> {
        let mut path = Vec::new();
        let mut cursor = Some(id.to_string());
        while let Some(current) = cursor {
            if path.len() > self.nodes.len() {
                return Err(TreeIntegrityError::CycleDetected {
                    node_id: id.to_string(),
                    parent_id: current,
                });
            }
            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| TreeIntegrityError::NodeNotFound {
                    node_id: current.clone(),
                })?;
            cursor = node.parent_id.clone();
            path.push(current);
        }
        path.reverse();
        Ok(path)
    }

    /// Remove a node and its whole subtree, returning the removed nodes.
    ///
    /// The cursor is truncated just above the removed node if it ran through it.
    pub(crate) fn remove_subtree(&mut self, id: &str) -> IntegrityResult<Vec<TopicNode>> {
        let parent_id = self
            .nodes
            .get(id)
            .ok_or_else(|| TreeIntegrityError::NodeNotFound {
                node_id: id.to_string(),
            })?
            .parent_id
            .clone();

        let mut doomed: Vec<String> = vec![id.to_string()];
        doomed.extend(self.all_descendants(id).into_iter().map(|n| n.id.clone()));

        match parent_id {
            Some(parent) => {
                if let Some(parent) = self.nodes.get_mut(&parent) {
                    parent.children.retain(|c| c != id);
                    parent.updated_at = Utc::now();
                }
            }
            None => self.root_ids.retain(|r| r != id),
        }

        if let Some(pos) = self
            .current_path
            .iter()
            .position(|p| doomed.iter().any(|d| d == p))
        {
            self.current_path.truncate(pos);
        }

        Ok(doomed
            .iter()
            .filter_map(|d| self.nodes.remove(d))
            .collect())
    }

    /// Replace the cursor after checking it forms a root-to-node chain.
    pub fn set_current_path(&mut self, path: Vec<String>) -> IntegrityResult<()> {
        crate::validation::validate_path(self, &path)?;
        self.current_path = path;
        Ok(())
    }
}
