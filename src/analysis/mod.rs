//! Topic analysis capability.
//!
//! A [`TopicAnalyzer`] extracts candidate topic labels from a turn and decides
//! how the primary candidate relates to the existing tree. Analyzers are
//! expected to fail; callers go through [`GuardedAnalyzer`], which applies a
//! deadline and substitutes the documented fallback on any failure.

mod keyword;
mod langbase;

pub use keyword::{is_stopword, significant_words, tokenize, KeywordTopicAnalyzer};
pub use langbase::LangbaseTopicAnalyzer;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capability::{call_with_timeout, Guarded};
use crate::error::{AnalysisError, AnalysisResult};
use crate::tree::{ConversationTree, Turn};
use crate::validation::sanitize_label;

/// Number of prompt words used for a fallback label.
pub const FALLBACK_LABEL_WORDS: usize = 5;
/// Confidence attached to fallback relationships.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// How a candidate topic relates to the existing tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// Unrelated to every existing topic.
    NewRoot,
    /// Narrower sub-topic of the anchor.
    ChildOf,
    /// Shares the anchor's parent.
    SiblingOf,
    /// Same subject as the anchor.
    Continuation,
}

impl RelationshipKind {
    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::NewRoot => "new_root",
            RelationshipKind::ChildOf => "child_of",
            RelationshipKind::SiblingOf => "sibling_of",
            RelationshipKind::Continuation => "continuation",
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelationshipKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "new_root" | "root" => Ok(RelationshipKind::NewRoot),
            "child_of" | "child" => Ok(RelationshipKind::ChildOf),
            "sibling_of" | "sibling" => Ok(RelationshipKind::SiblingOf),
            "continuation" | "continue" => Ok(RelationshipKind::Continuation),
            _ => Err(format!("Unknown relationship kind: {}", s)),
        }
    }
}

/// A proposed placement for a candidate topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub kind: RelationshipKind,
    /// The existing node the relationship refers to: the parent for
    /// `child_of`, the sibling for `sibling_of`, the continued node for
    /// `continuation`. Absent for `new_root`.
    #[serde(alias = "parent_node_id")]
    pub anchor_node_id: Option<String>,
    /// Confidence in [0.0, 1.0].
    pub confidence: f64,
}

impl Relationship {
    /// Start a new root topic
    pub fn new_root(confidence: f64) -> Self {
        Self {
            kind: RelationshipKind::NewRoot,
            anchor_node_id: None,
            confidence,
        }
    }

    /// Attach under `parent_id`
    pub fn child_of(parent_id: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind: RelationshipKind::ChildOf,
            anchor_node_id: Some(parent_id.into()),
            confidence,
        }
    }

    /// Attach next to `sibling_id`
    pub fn sibling_of(sibling_id: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind: RelationshipKind::SiblingOf,
            anchor_node_id: Some(sibling_id.into()),
            confidence,
        }
    }

    /// Continue `node_id`
    pub fn continuation(node_id: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind: RelationshipKind::Continuation,
            anchor_node_id: Some(node_id.into()),
            confidence,
        }
    }
}

/// Lightweight view of an existing topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRef {
    pub id: String,
    pub label: String,
    pub depth: usize,
}

impl TopicRef {
    pub fn new(id: impl Into<String>, label: impl Into<String>, depth: usize) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            depth,
        }
    }
}

/// What an analyzer may know about the tree when classifying a candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipContext {
    /// The active topic, if any.
    pub current: Option<TopicRef>,
    /// Every topic in display order.
    pub topics: Vec<TopicRef>,
    /// Ids from a root to the active topic.
    #[serde(default)]
    pub path: Vec<String>,
}

impl RelationshipContext {
    /// Build a context from a tree
    pub fn from_tree(tree: &ConversationTree) -> Self {
        let as_ref =
            |n: &crate::tree::TopicNode| TopicRef::new(n.id.clone(), n.label.clone(), n.depth);
        Self {
            current: tree.current_node().map(as_ref),
            topics: tree.preorder().into_iter().map(as_ref).collect(),
            path: tree.current_path().to_vec(),
        }
    }

    /// Whether `id` names a known topic.
    pub fn contains(&self, id: &str) -> bool {
        self.topics.iter().any(|t| t.id == id)
    }

    /// Topic whose label matches case-insensitively, nearest to the cursor.
    ///
    /// Searches the active path from the cursor upwards, then the active
    /// topic's subtree, then every topic in display order.
    pub fn find_by_label(&self, label: &str) -> Option<&TopicRef> {
        let label = label.trim();
        let matches = |t: &&TopicRef| t.label.eq_ignore_ascii_case(label);

        let on_path = self
            .path
            .iter()
            .rev()
            .filter_map(|id| self.topics.iter().find(|t| &t.id == id))
            .find(matches);
        if on_path.is_some() {
            return on_path;
        }

        if let Some(current) = &self.current {
            let subtree = self
                .topics
                .iter()
                .skip_while(|t| t.id != current.id)
                .skip(1)
                .take_while(|t| t.depth > current.depth)
                .find(matches);
            if subtree.is_some() {
                return subtree;
            }
        }

        self.topics.iter().find(matches)
    }
}

/// Topic extraction and relationship classification.
///
/// Implementations usually call an external service and may fail or hang;
/// the orchestrator only reaches them through [`GuardedAnalyzer`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TopicAnalyzer: Send + Sync {
    /// Candidate topic labels for a turn, primary first.
    async fn extract_topics(&self, turn: &Turn) -> AnalysisResult<Vec<String>>;

    /// Classify how `candidate` relates to the existing topics.
    async fn determine_relationship(
        &self,
        candidate: &str,
        context: &RelationshipContext,
    ) -> AnalysisResult<Relationship>;
}

/// Labels used when topic extraction fails: the first few prompt words.
pub fn fallback_topics(turn: &Turn) -> Vec<String> {
    let head = turn
        .prompt
        .split_whitespace()
        .take(FALLBACK_LABEL_WORDS)
        .collect::<Vec<_>>()
        .join(" ");
    vec![sanitize_label(&head).unwrap_or_else(|| "General".to_string())]
}

/// Placement used when relationship classification fails.
///
/// Continues the current branch when there is one.
pub fn fallback_relationship(context: &RelationshipContext) -> Relationship {
    match &context.current {
        Some(current) => Relationship::continuation(current.id.clone(), FALLBACK_CONFIDENCE),
        None => Relationship::new_root(FALLBACK_CONFIDENCE),
    }
}

/// Sanitize, dedupe (case-insensitively) and drop empty labels.
fn clean_topics(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|t| sanitize_label(t))
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}

fn check_relationship(
    relationship: &Relationship,
    context: &RelationshipContext,
) -> AnalysisResult<()> {
    if !relationship.confidence.is_finite() || !(0.0..=1.0).contains(&relationship.confidence) {
        return Err(AnalysisError::InvalidOutput {
            message: format!("confidence {} outside [0, 1]", relationship.confidence),
        });
    }
    match (relationship.kind, relationship.anchor_node_id.as_deref()) {
        (RelationshipKind::NewRoot, _) => Ok(()),
        (_, Some(anchor)) if context.contains(anchor) => Ok(()),
        (kind, Some(anchor)) => Err(AnalysisError::InvalidOutput {
            message: format!("{} refers to unknown node {}", kind, anchor),
        }),
        (kind, None) => Err(AnalysisError::InvalidOutput {
            message: format!("{} without an anchor node", kind),
        }),
    }
}

/// A [`TopicAnalyzer`] behind a deadline and a fallback.
#[derive(Clone)]
pub struct GuardedAnalyzer {
    inner: Arc<dyn TopicAnalyzer>,
    timeout: Duration,
}

impl GuardedAnalyzer {
    pub fn new(inner: Arc<dyn TopicAnalyzer>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Extract topics; never fails.
    pub async fn extract_topics(&self, turn: &Turn) -> Guarded<Vec<String>> {
        let result = call_with_timeout(
            self.timeout,
            self.inner.extract_topics(turn),
            |timeout_ms| AnalysisError::Timeout { timeout_ms },
        )
        .await
        .and_then(|raw| {
            let topics = clean_topics(raw);
            if topics.is_empty() {
                Err(AnalysisError::InvalidOutput {
                    message: "no usable topic labels".to_string(),
                })
            } else {
                Ok(topics)
            }
        });

        match result {
            Ok(topics) => Guarded::ok(topics),
            Err(e) => {
                warn!(error = %e, "Topic extraction failed, using prompt-derived label");
                Guarded::fallback(fallback_topics(turn), format!("topic extraction: {}", e))
            }
        }
    }

    /// Classify a candidate; never fails.
    pub async fn determine_relationship(
        &self,
        candidate: &str,
        context: &RelationshipContext,
    ) -> Guarded<Relationship> {
        let result = call_with_timeout(
            self.timeout,
            self.inner.determine_relationship(candidate, context),
            |timeout_ms| AnalysisError::Timeout { timeout_ms },
        )
        .await
        .and_then(|rel| check_relationship(&rel, context).map(|_| rel));

        match result {
            Ok(relationship) => {
                debug!(
                    candidate = %candidate,
                    kind = %relationship.kind,
                    confidence = relationship.confidence,
                    "Relationship resolved"
                );
                Guarded::ok(relationship)
            }
            Err(e) => {
                warn!(
                    candidate = %candidate,
                    error = %e,
                    "Relationship classification failed, using fallback"
                );
                Guarded::fallback(
                    fallback_relationship(context),
                    format!("relationship: {}", e),
                )
            }
        }
    }
}
