use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use super::{Relationship, RelationshipContext, TopicAnalyzer};
use crate::error::{AnalysisError, AnalysisResult};
use crate::tree::Turn;
use crate::validation::sanitize_label;

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "actually", "after", "again", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "basically", "be", "because", "been", "before", "being", "below",
    "between", "both", "but", "by", "can", "could", "describe", "did", "do", "does", "doing",
    "done", "down", "during", "each", "explain", "few", "for", "from", "further", "get", "got",
    "had", "has", "have", "having", "he", "her", "here", "him", "his", "how", "i", "if", "in",
    "into", "is", "it", "its", "just", "kind", "know", "like", "lot", "me", "mean", "more",
    "most", "much", "my", "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or",
    "other", "our", "out", "over", "own", "pretty", "really", "same", "she", "should", "so",
    "some", "something", "such", "sure", "tell", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "thing", "things", "think", "this", "those", "through", "to",
    "too", "under", "until", "up", "use", "used", "uses", "using", "very", "was", "way", "we",
    "well", "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
    "with", "would", "yeah", "yes", "you", "your", "yours",
];

/// Whether a lowercase word carries no topical meaning.
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

/// Split text into words, keeping `+` and `#` so "C++" and "C#" survive.
pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || matches!(c, '+' | '#' | '\'' | '-' | '.')))
        .map(|w| w.trim_matches(|c: char| matches!(c, '\'' | '-' | '.')))
        .filter(|w| !w.is_empty())
}

/// Lowercased words of at least three characters that are not stopwords or numbers.
pub fn significant_words(text: &str) -> Vec<String> {
    tokenize(text)
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() >= 3)
        .filter(|w| !is_stopword(w) && !w.contains('\''))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit() || c == '.'))
        .collect()
}

/// In-process topic analyzer based on keyword frequency.
///
/// Capitalised terms and terms from the question rank higher. Relationship
/// classification only recognizes continuations: a candidate matching an
/// existing label continues that node, otherwise the current node is
/// continued, and an empty tree starts a new root.
#[derive(Debug, Clone)]
pub struct KeywordTopicAnalyzer {
    max_topics: usize,
}

impl Default for KeywordTopicAnalyzer {
    fn default() -> Self {
        Self { max_topics: 5 }
    }
}

impl KeywordTopicAnalyzer {
    /// Create an analyzer returning at most `max_topics` labels per turn
    pub fn new(max_topics: usize) -> Self {
        Self {
            max_topics: max_topics.max(1),
        }
    }

    fn rank_keywords(&self, turn: &Turn) -> Vec<String> {
        // lowercase key -> (display form, weight, first position)
        let mut ranked: HashMap<String, (String, f64, usize)> = HashMap::new();
        let sources = [(turn.prompt.as_str(), 1.5), (turn.response.as_str(), 1.0)];

        let mut position = 0usize;
        for (text, source_weight) in sources {
            for word in tokenize(text) {
                position += 1;
                let key = word.to_lowercase();
                let capitalised = word.chars().next().is_some_and(|c| c.is_uppercase());
                let chars = key.chars().count();
                let long_enough = chars >= 3 || (capitalised && chars >= 2);
                if !long_enough || is_stopword(&key) || key.contains('\'') {
                    continue;
                }
                if key.chars().all(|c| c.is_ascii_digit() || c == '.') {
                    continue;
                }
                let weight = source_weight + if capitalised { 1.0 } else { 0.0 };
                ranked
                    .entry(key)
                    .and_modify(|(_, w, _)| *w += weight)
                    .or_insert_with(|| (word.to_string(), weight, position));
            }
        }

        let mut entries: Vec<(String, f64, usize)> = ranked.into_values().collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));
        entries
            .into_iter()
            .filter_map(|(display, _, _)| sanitize_label(&display))
            .take(self.max_topics)
            .collect()
    }
}

#[async_trait]
impl TopicAnalyzer for KeywordTopicAnalyzer {
    async fn extract_topics(&self, turn: &Turn) -> AnalysisResult<Vec<String>> {
        let topics = self.rank_keywords(turn);
        if topics.is_empty() {
            return Err(AnalysisError::InvalidOutput {
                message: "no keywords found in turn".to_string(),
            });
        }
        debug!(topics = ?topics, "Keyword topics extracted");
        Ok(topics)
    }

    async fn determine_relationship(
        &self,
        candidate: &str,
        context: &RelationshipContext,
    ) -> AnalysisResult<Relationship> {
        if let Some(existing) = context.find_by_label(candidate) {
            return Ok(Relationship::continuation(existing.id.clone(), 0.9));
        }
        Ok(match &context.current {
            Some(current) => Relationship::continuation(current.id.clone(), 0.55),
            None => Relationship::new_root(0.6),
        })
    }
}
