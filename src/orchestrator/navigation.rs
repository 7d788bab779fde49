//! Adaptive interview navigation over a [`TreeManager`].
//!
//! Fan out on rich answers, backtrack on exhausted ones, and suggest where the
//! next question should go.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::IntegrityResult;
use crate::tree::{TopicNode, TreeManager};
use crate::validation::sanitize_label;

/// Maximum suggestions returned per turn.
pub const MAX_SUGGESTIONS: usize = 5;

/// How the cursor moved after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationAction {
    /// The cursor stays on the node the turn attached to.
    Continue,
    /// New sub-topics were created and the cursor moved into the first one.
    Descend,
    /// The topic was exhausted and the cursor moved away from it.
    Backtrack,
}

impl NavigationAction {
    /// Get the action name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationAction::Continue => "continue",
            NavigationAction::Descend => "descend",
            NavigationAction::Backtrack => "backtrack",
        }
    }
}

impl std::fmt::Display for NavigationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a suggestion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    Child,
    Sibling,
    DeepestBranch,
}

/// A candidate topic for the next question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub node_id: String,
    pub label: String,
    pub depth: usize,
    pub source: SuggestionSource,
}

impl Suggestion {
    fn from_node(node: &TopicNode, source: SuggestionSource) -> Self {
        Self {
            node_id: node.id.clone(),
            label: node.label.clone(),
            depth: node.depth,
            source,
        }
    }
}

/// Create one child per new label under `parent_id` and descend into the first.
///
/// Labels already present as children or on the parent's own path are
/// skipped, as are labels that would break the size or depth ceiling.
/// Returns the ids of the created children.
pub fn fan_out(
    manager: &mut TreeManager,
    parent_id: &str,
    labels: &[String],
) -> IntegrityResult<Vec<String>> {
    let lineage = manager.tree().path_to(parent_id)?;
    let mut seen: HashSet<String> = lineage
        .iter()
        .filter_map(|id| manager.tree().node(id))
        .chain(manager.children(parent_id))
        .map(|n| n.label.to_lowercase())
        .collect();
    let mut created = Vec::new();

    for raw in labels {
        let Some(label) = sanitize_label(raw) else {
            continue;
        };
        if !seen.insert(label.to_lowercase()) {
            continue;
        }
        let depth_ok = manager
            .child_depth(parent_id)
            .is_some_and(|d| d <= manager.limits().max_depth);
        if !manager.has_capacity() || !depth_ok {
            warn!(
                parent_id = %parent_id,
                label = %label,
                "Tree ceiling reached, skipping remaining sub-topics"
            );
            break;
        }
        created.push(manager.add_node(TopicNode::new(label), Some(parent_id))?);
    }

    if let Some(first) = created.first() {
        manager.mark_rich(parent_id)?;
        manager.move_cursor_to(first)?;
        manager.mark_visited(first)?;
        debug!(parent_id = %parent_id, created = created.len(), "Fanned out into new sub-topics");
    }
    Ok(created)
}

/// Exhaust `node_id` and move the cursor to the next open branch.
///
/// Hops to the first unvisited, non-exhausted sibling; otherwise climbs,
/// exhausting each parent whose children are all exhausted, until an open
/// sibling is found or a root is reached. Roots are never exhausted; a turn
/// exhausted at a root jumps to the deepest unvisited branch if there is one.
/// Returns the id the cursor ends on.
pub fn backtrack(manager: &mut TreeManager, node_id: &str) -> IntegrityResult<String> {
    let is_root = manager.tree().node(node_id).map_or(true, |n| n.is_root());
    if is_root {
        if let Some(target) = manager.deepest_unvisited_branch().map(|n| n.id.clone()) {
            land(manager, &target)?;
            return Ok(target);
        }
        return Ok(node_id.to_string());
    }

    manager.mark_exhausted(node_id)?;
    let mut level = node_id.to_string();

    loop {
        if let Some(sibling) = manager
            .siblings(&level)
            .into_iter()
            .find(|s| s.is_unexplored())
            .map(|s| s.id.clone())
        {
            land(manager, &sibling)?;
            return Ok(sibling);
        }

        let Some(parent) = manager.tree().node(&level).and_then(|n| n.parent_id.clone()) else {
            // A root with no open siblings; stay on it.
            land(manager, &level)?;
            return Ok(level);
        };

        let parent_is_root = manager.tree().node(&parent).map_or(true, |p| p.is_root());
        if parent_is_root {
            land(manager, &parent)?;
            return Ok(parent);
        }

        let all_children_exhausted = manager
            .children(&parent)
            .iter()
            .all(|c| c.metadata.exhausted);
        if all_children_exhausted {
            manager.mark_exhausted(&parent)?;
        }
        level = parent;
    }
}

fn land(manager: &mut TreeManager, id: &str) -> IntegrityResult<()> {
    manager.move_cursor_to(id)?;
    manager.mark_visited(id)
}

/// Next-question candidates around the cursor.
///
/// Unvisited children first, then unvisited siblings, then the deepest
/// unvisited branch anywhere in the tree.
pub fn suggestions(manager: &TreeManager) -> Vec<Suggestion> {
    let mut out: Vec<Suggestion> = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |node: &TopicNode, source: SuggestionSource, out: &mut Vec<Suggestion>| {
        if out.len() < MAX_SUGGESTIONS && seen.insert(node.id.clone()) {
            out.push(Suggestion::from_node(node, source));
        }
    };

    if let Some(current) = manager.current_topic() {
        for child in manager.children(&current.id) {
            if child.is_unexplored() {
                push(child, SuggestionSource::Child, &mut out);
            }
        }
        for sibling in manager.siblings(&current.id) {
            if sibling.is_unexplored() {
                push(sibling, SuggestionSource::Sibling, &mut out);
            }
        }
    }
    if let Some(deepest) = manager.deepest_unvisited_branch() {
        push(deepest, SuggestionSource::DeepestBranch, &mut out);
    }
    out
}
