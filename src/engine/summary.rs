use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::analysis::significant_words;
use crate::tree::{render_tree, ConversationTree};

/// Number of buzzwords reported in a summary.
pub const TOP_BUZZWORDS: usize = 10;

/// How much of the tree has been covered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCoverage {
    /// Nodes visited at least once.
    pub explored: usize,
    /// Nodes that spawned sub-topics.
    pub rich: usize,
    pub exhausted: usize,
}

/// End-of-interview view of a session's tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewSummary {
    pub session_id: String,
    pub total_nodes: usize,
    pub max_depth_reached: usize,
    /// Mean score over every turn, `None` before the first turn.
    pub average_score: Option<f64>,
    pub topic_coverage: TopicCoverage,
    pub top_buzzwords: Vec<String>,
    pub exhausted_topics: Vec<String>,
    pub turn_count: usize,
    pub rendered_tree_text: String,
}

/// Summarize a tree. Pure: the same tree always yields the same summary.
pub fn summarize(tree: &ConversationTree) -> InterviewSummary {
    let mut coverage = TopicCoverage::default();
    let mut weighted = 0.0;
    let mut scored_turns = 0usize;

    for node in tree.nodes() {
        if node.is_visited() {
            coverage.explored += 1;
        }
        if node.metadata.rich {
            coverage.rich += 1;
        }
        if node.metadata.exhausted {
            coverage.exhausted += 1;
        }
        if let Some(score) = node.score {
            let turns = node.metadata.turns.len();
            weighted += score * turns as f64;
            scored_turns += turns;
        }
    }

    let history = tree.turn_history();
    InterviewSummary {
        session_id: tree.session_id.clone(),
        total_nodes: tree.len(),
        max_depth_reached: tree.max_depth_reached,
        average_score: (scored_turns > 0).then(|| weighted / scored_turns as f64),
        topic_coverage: coverage,
        top_buzzwords: top_buzzwords(history.iter().map(|t| t.response.as_str()), TOP_BUZZWORDS),
        exhausted_topics: tree.exhausted_topics.clone(),
        turn_count: history.len(),
        rendered_tree_text: render_tree(tree),
    }
}

/// Most frequent significant words, ties broken alphabetically.
pub fn top_buzzwords<'a>(texts: impl Iterator<Item = &'a str>, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for word in significant_words(text) {
            *counts.entry(word).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(word, _)| word).collect()
}
