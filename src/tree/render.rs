use std::fmt::Write as _;

use super::{ConversationTree, TopicNode};

/// Exploration status shown next to each topic.
pub fn node_status(node: &TopicNode) -> &'static str {
    if node.metadata.exhausted {
        "exhausted"
    } else if node.metadata.rich {
        "rich"
    } else if node.is_visited() {
        "explored"
    } else {
        "unvisited"
    }
}

/// Render the tree as indented ASCII text.
///
/// One line per topic with its score and status; the active node is marked
/// with `<`. Output is deterministic for a given tree.
pub fn render_tree(tree: &ConversationTree) -> String {
    if tree.is_empty() {
        return "(empty tree)\n".to_string();
    }

    let current = tree.current_node().map(|n| n.id.as_str());
    let mut out = String::new();

    // (node id, prefix inherited from ancestors, Some(is_last) for non-roots)
    let mut stack: Vec<(&str, String, Option<bool>)> = tree
        .root_ids()
        .iter()
        .rev()
        .map(|id| (id.as_str(), String::new(), None))
        .collect();

    while let Some((id, prefix, is_last)) = stack.pop() {
        let Some(node) = tree.node(id) else {
            continue;
        };

        let score = node
            .score
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "-".to_string());
        let marker = if current == Some(id) { " <" } else { "" };
        let connector = match is_last {
            None => "",
            Some(true) => "└── ",
            Some(false) => "├── ",
        };
        let _ = writeln!(
            out,
            "{}{}{} [{}] ({}){}",
            prefix,
            connector,
            node.label,
            score,
            node_status(node),
            marker
        );

        let child_prefix = match is_last {
            None => String::new(),
            Some(true) => format!("{}    ", prefix),
            Some(false) => format!("{}│   ", prefix),
        };
        let count = node.children.len();
        for (i, child_id) in node.children.iter().enumerate().rev() {
            stack.push((child_id.as_str(), child_prefix.clone(), Some(i + 1 == count)));
        }
    }

    out
}
