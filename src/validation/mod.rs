//! Input validation and tree integrity checks.
//!
//! Everything here is a pure function. Input checks return [`ValidationError`]
//! and run before anything touches a tree; structural checks return
//! [`TreeIntegrityError`] and run after every mutation.

use std::collections::HashSet;

use crate::error::{IntegrityResult, TreeIntegrityError, ValidationError, ValidationResult};
use crate::tree::{ConversationTree, Turn};

/// Maximum prompt length in characters.
pub const MAX_PROMPT_CHARS: usize = 5_000;
/// Maximum response length in characters.
pub const MAX_RESPONSE_CHARS: usize = 20_000;
/// Maximum serialized turn metadata size in bytes.
pub const MAX_METADATA_BYTES: usize = 16 * 1024;
/// Maximum number of topics a turn's signals may carry.
pub const MAX_SIGNAL_TOPICS: usize = 10;
/// Maximum topic label length in characters.
pub const MAX_LABEL_CHARS: usize = 200;
/// Maximum session id length.
pub const MAX_SESSION_ID_CHARS: usize = 128;
/// Lowest valid score.
pub const MIN_SCORE: f64 = 0.0;
/// Highest valid score.
pub const MAX_SCORE: f64 = 2.0;

/// Reject control characters other than newline, carriage return and tab.
///
/// This covers NUL bytes and the ESC that starts ANSI sequences.
pub fn check_content(field: &str, text: &str) -> ValidationResult<()> {
    if let Some(c) = text
        .chars()
        .find(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    {
        return Err(ValidationError::DisallowedContent {
            field: field.to_string(),
            reason: format!("control character U+{:04X}", c as u32),
        });
    }
    Ok(())
}

fn check_length(field: &str, text: &str, max: usize) -> ValidationResult<()> {
    let actual = text.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
            actual,
        });
    }
    Ok(())
}

/// Validate the shape and size of a turn.
pub fn validate_turn(turn: &Turn) -> ValidationResult<()> {
    if turn.prompt.trim().is_empty() {
        return Err(ValidationError::Empty {
            field: "prompt".to_string(),
        });
    }
    check_length("prompt", &turn.prompt, MAX_PROMPT_CHARS)?;
    check_content("prompt", &turn.prompt)?;

    check_length("response", &turn.response, MAX_RESPONSE_CHARS)?;
    check_content("response", &turn.response)?;

    if let Some(metadata) = &turn.metadata {
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
            });
        }
    }

    if turn.signals.new_topics.len() > MAX_SIGNAL_TOPICS {
        return Err(ValidationError::TooLong {
            field: "signals.new_topics".to_string(),
            max: MAX_SIGNAL_TOPICS,
            actual: turn.signals.new_topics.len(),
        });
    }
    for topic in &turn.signals.new_topics {
        validate_label(topic)?;
    }
    for tag in &turn.signals.exhaustion {
        check_length("signals.exhaustion", tag, MAX_LABEL_CHARS)?;
        check_content("signals.exhaustion", tag)?;
    }

    Ok(())
}

/// Validate a score: finite and within [0.0, 2.0].
pub fn validate_score(score: f64) -> ValidationResult<f64> {
    if !score.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(ValidationError::OutOfRange {
            field: "score".to_string(),
            value: score,
            min: MIN_SCORE,
            max: MAX_SCORE,
        });
    }
    Ok(score)
}

/// Validate a topic label.
pub fn validate_label(label: &str) -> ValidationResult<()> {
    if label.trim().is_empty() {
        return Err(ValidationError::Empty {
            field: "label".to_string(),
        });
    }
    check_length("label", label, MAX_LABEL_CHARS)?;
    check_content("label", label)
}

/// Validate a session id: 1-128 characters of `[A-Za-z0-9_-]`.
pub fn validate_session_id(id: &str) -> ValidationResult<()> {
    if id.is_empty() {
        return Err(ValidationError::Empty {
            field: "session_id".to_string(),
        });
    }
    check_length("session_id", id, MAX_SESSION_ID_CHARS)?;
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::Malformed {
            field: "session_id".to_string(),
            reason: "only ASCII letters, digits, '-' and '_' are allowed".to_string(),
        });
    }
    Ok(())
}

/// Normalize a raw topic label.
///
/// Collapses whitespace, strips control characters, trims surrounding
/// punctuation and truncates to [`MAX_LABEL_CHARS`]. Returns `None` when
/// nothing usable remains.
pub fn sanitize_label(raw: &str) -> Option<String> {
    let collapsed = raw
        .split_whitespace()
        .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    // '+' and '#' survive so labels like "C++" and "C#" keep their meaning.
    let trimmed = collapsed.trim_matches(|c: char| {
        (c.is_ascii_punctuation() && c != '+' && c != '#') || c.is_whitespace()
    });
    if trimmed.is_empty() {
        return None;
    }

    Some(trimmed.chars().take(MAX_LABEL_CHARS).collect::<String>().trim_end().to_string())
}

/// Check that `path` is a root-to-node chain in `tree`.
///
/// An empty path is valid (no active node).
pub fn validate_path(tree: &ConversationTree, path: &[String]) -> IntegrityResult<()> {
    let mut previous: Option<&str> = None;
    for id in path {
        let node = tree.node(id).ok_or_else(|| TreeIntegrityError::InvalidPath {
            reason: format!("node {} does not exist", id),
        })?;
        match previous {
            None if !node.is_root() => {
                return Err(TreeIntegrityError::InvalidPath {
                    reason: format!("path starts at non-root node {}", id),
                });
            }
            Some(parent) if node.parent_id.as_deref() != Some(parent) => {
                return Err(TreeIntegrityError::InvalidPath {
                    reason: format!("node {} is not a child of {}", id, parent),
                });
            }
            _ => {}
        }
        previous = Some(id);
    }
    Ok(())
}

/// Check every structural invariant of a tree.
///
/// Depth consistency, acyclicity (each node reached exactly once from the
/// roots), bidirectional parent/child links and cursor integrity.
pub fn validate_tree_integrity(tree: &ConversationTree) -> IntegrityResult<()> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(tree.len());
    let mut stack: Vec<&str> = Vec::new();

    for root_id in tree.root_ids() {
        let root = tree
            .node(root_id)
            .ok_or_else(|| TreeIntegrityError::NodeNotFound {
                node_id: root_id.clone(),
            })?;
        if let Some(parent_id) = &root.parent_id {
            return Err(TreeIntegrityError::LinkMismatch {
                parent_id: parent_id.clone(),
                child_id: root_id.clone(),
            });
        }
        if root.depth != 1 {
            return Err(TreeIntegrityError::DepthMismatch {
                node_id: root_id.clone(),
                expected: 1,
                actual: root.depth,
            });
        }
        stack.push(root_id);
    }

    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            return Err(TreeIntegrityError::DuplicateVisit {
                node_id: id.to_string(),
            });
        }
        let node = tree
            .node(id)
            .ok_or_else(|| TreeIntegrityError::NodeNotFound {
                node_id: id.to_string(),
            })?;
        for child_id in &node.children {
            let child = tree
                .node(child_id)
                .ok_or_else(|| TreeIntegrityError::NodeNotFound {
                    node_id: child_id.clone(),
                })?;
            if child.parent_id.as_deref() != Some(id) {
                return Err(TreeIntegrityError::LinkMismatch {
                    parent_id: id.to_string(),
                    child_id: child_id.clone(),
                });
            }
            if child.depth != node.depth + 1 {
                return Err(TreeIntegrityError::DepthMismatch {
                    node_id: child_id.clone(),
                    expected: node.depth + 1,
                    actual: child.depth,
                });
            }
            stack.push(child_id);
        }
    }

    if seen.len() != tree.len() {
        if let Some(orphan) = tree.nodes().find(|n| !seen.contains(n.id.as_str())) {
            return Err(TreeIntegrityError::Unreachable {
                node_id: orphan.id.clone(),
            });
        }
    }

    validate_path(tree, tree.current_path())
}

/// Enforce the node-count ceiling.
pub fn validate_tree_size(tree: &ConversationTree, max_nodes: usize) -> IntegrityResult<()> {
    if tree.len() > max_nodes {
        return Err(TreeIntegrityError::SizeCeilingExceeded {
            count: tree.len(),
            max: max_nodes,
        });
    }
    Ok(())
}

/// Enforce the depth ceiling.
pub fn validate_tree_depth(tree: &ConversationTree, max_depth: usize) -> IntegrityResult<()> {
    let depth = tree.max_depth();
    if depth > max_depth {
        return Err(TreeIntegrityError::DepthCeilingExceeded {
            depth,
            max: max_depth,
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;
