//! Question/answer turns and the interview signals that may accompany them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Candidate engagement level observed for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    /// Detailed, enthusiastic answer.
    High,
    /// Adequate answer.
    Medium,
    /// Minimal or evasive answer.
    Low,
}

impl EngagementLevel {
    /// Get the level name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementLevel::High => "high",
            EngagementLevel::Medium => "medium",
            EngagementLevel::Low => "low",
        }
    }
}

impl std::fmt::Display for EngagementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EngagementLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(EngagementLevel::High),
            "medium" | "neutral" => Ok(EngagementLevel::Medium),
            "low" => Ok(EngagementLevel::Low),
            _ => Err(format!("Unknown engagement level: {}", s)),
        }
    }
}

/// Signals detected upstream for a turn (by the interviewer layer or an evaluator).
///
/// Every field is optional; missing signals are derived from the turn text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnSignals {
    /// Observed engagement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement: Option<EngagementLevel>,
    /// Topics newly raised by the candidate in this answer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_topics: Vec<String>,
    /// Exhaustion tags such as `dont_know`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exhaustion: Vec<String>,
}

impl TurnSignals {
    /// Whether no signal was supplied at all.
    pub fn is_empty(&self) -> bool {
        self.engagement.is_none() && self.new_topics.is_empty() && self.exhaustion.is_empty()
    }
}

/// One question/answer exchange. Immutable once attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// The interviewer's question.
    pub prompt: String,
    /// The candidate's answer.
    pub response: String,
    /// When the exchange happened.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata supplied by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Upstream interview signals.
    #[serde(default, skip_serializing_if = "TurnSignals::is_empty")]
    pub signals: TurnSignals,
}

impl Turn {
    /// Create a new turn stamped with the current time
    pub fn new(prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            response: response.into(),
            timestamp: Utc::now(),
            metadata: None,
            signals: TurnSignals::default(),
        }
    }

    /// Set metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Set the engagement signal
    pub fn with_engagement(mut self, engagement: EngagementLevel) -> Self {
        self.signals.engagement = Some(engagement);
        self
    }

    /// Set newly raised topics
    pub fn with_new_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signals.new_topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Set exhaustion tags
    pub fn with_exhaustion<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signals.exhaustion = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Number of whitespace-separated words in the response.
    pub fn response_word_count(&self) -> usize {
        self.response.split_whitespace().count()
    }
}
