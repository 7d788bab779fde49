//! Default interview grading policy and turn assessment.
//!
//! The weights and length buckets are tuning values, not a scoring law;
//! swap the strategy to change them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ScoringContext, ScoringStrategy};
use crate::error::ScoringResult;
use crate::tree::{EngagementLevel, Turn};

/// Phrases that mark a candidate running out of things to say, with their tags.
const EXHAUSTION_PHRASES: &[(&str, &str)] = &[
    ("don't know", "dont_know"),
    ("dont know", "dont_know"),
    ("do not know", "dont_know"),
    ("not sure", "not_sure"),
    ("no idea", "no_idea"),
    ("never used", "never_used"),
    ("haven't", "havent"),
    ("have not", "havent"),
    ("can't remember", "cant_remember"),
    ("cannot remember", "cant_remember"),
    ("don't remember", "cant_remember"),
    ("no experience", "no_experience"),
    ("not familiar", "not_familiar"),
];

/// Answers shorter than this many words count as exhausted.
pub const SHORT_ANSWER_WORDS: usize = 4;

/// What the engine concluded about a turn before scoring it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnAssessment {
    pub engagement: EngagementLevel,
    /// Whether the engagement came from the text rather than an upstream signal.
    pub engagement_derived: bool,
    pub exhausted: bool,
    /// Exhaustion tags, explicit or detected.
    pub exhaustion_signals: Vec<String>,
    pub word_count: usize,
}

/// Detect exhaustion tags in an answer.
pub fn detect_exhaustion(response: &str) -> Vec<String> {
    let lowered = response.to_lowercase().replace('’', "'");
    let mut tags: Vec<String> = Vec::new();
    for (phrase, tag) in EXHAUSTION_PHRASES {
        if lowered.contains(phrase) && !tags.iter().any(|t| t == tag) {
            tags.push((*tag).to_string());
        }
    }
    if response.split_whitespace().count() < SHORT_ANSWER_WORDS {
        tags.push("short_answer".to_string());
    }
    tags
}

/// Engagement implied by answer length alone.
pub fn engagement_from_length(word_count: usize) -> EngagementLevel {
    match word_count {
        n if n >= 60 => EngagementLevel::High,
        n if n >= 15 => EngagementLevel::Medium,
        _ => EngagementLevel::Low,
    }
}

/// Assess a turn's engagement and exhaustion.
///
/// Upstream signals win. Text heuristics only run when the turn carries
/// neither an engagement level nor exhaustion tags.
pub fn assess_turn(turn: &Turn) -> TurnAssessment {
    let word_count = turn.response_word_count();
    let signals = &turn.signals;

    let exhaustion_signals = if !signals.exhaustion.is_empty() {
        signals.exhaustion.clone()
    } else if signals.engagement.is_none() {
        detect_exhaustion(&turn.response)
    } else {
        Vec::new()
    };
    let exhausted = !exhaustion_signals.is_empty();

    let (engagement, engagement_derived) = match signals.engagement {
        Some(level) => (level, false),
        None if exhausted => (EngagementLevel::Low, true),
        None => (engagement_from_length(word_count), true),
    };

    TurnAssessment {
        engagement,
        engagement_derived,
        exhausted,
        exhaustion_signals,
        word_count,
    }
}

/// Heuristic used when the scoring strategy fails: length and depth only.
pub fn fallback_score(word_count: usize, depth: usize) -> f64 {
    let length = (word_count as f64 / 100.0).min(1.0);
    let depth_penalty = 1.0 + 0.1 * (depth.max(1) - 1) as f64;
    (0.2 + 1.8 * length) / depth_penalty
}

/// Engagement-weighted, length-bucketed grading.
#[derive(Debug, Clone, PartialEq)]
pub struct InterviewGradingPolicy {
    pub high_weight: f64,
    pub medium_weight: f64,
    pub low_weight: f64,
    /// (minimum words, factor), checked from the first entry down.
    pub length_buckets: Vec<(usize, f64)>,
    pub floor_factor: f64,
    /// Ceiling for exhausted turns, kept below the 1.0 midpoint.
    pub exhausted_cap: f64,
}

impl Default for InterviewGradingPolicy {
    fn default() -> Self {
        Self {
            high_weight: 1.0,
            medium_weight: 0.7,
            low_weight: 0.4,
            length_buckets: vec![(80, 1.0), (30, 0.75), (8, 0.5)],
            floor_factor: 0.25,
            exhausted_cap: 0.95,
        }
    }
}

impl InterviewGradingPolicy {
    fn weight(&self, engagement: EngagementLevel) -> f64 {
        match engagement {
            EngagementLevel::High => self.high_weight,
            EngagementLevel::Medium => self.medium_weight,
            EngagementLevel::Low => self.low_weight,
        }
    }

    fn length_factor(&self, word_count: usize) -> f64 {
        self.length_buckets
            .iter()
            .find(|(min_words, _)| word_count >= *min_words)
            .map(|(_, factor)| *factor)
            .unwrap_or(self.floor_factor)
    }

    /// Score a turn from its assessment.
    pub fn grade(&self, assessment: &TurnAssessment) -> f64 {
        let base = 2.0
            * self.weight(assessment.engagement)
            * self.length_factor(assessment.word_count);
        let score = if assessment.exhausted {
            (0.5 * base).min(self.exhausted_cap)
        } else {
            base
        };
        score.clamp(0.0, 2.0)
    }
}

#[async_trait]
impl ScoringStrategy for InterviewGradingPolicy {
    async fn calculate_score(&self, _turn: &Turn, context: &ScoringContext) -> ScoringResult<f64> {
        Ok(self.grade(&context.assessment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    fn assessment(
        engagement: EngagementLevel,
        word_count: usize,
        exhausted: bool,
    ) -> TurnAssessment {
        TurnAssessment {
            engagement,
            engagement_derived: false,
            exhausted,
            exhaustion_signals: Vec::new(),
            word_count,
        }
    }

    #[test]
    fn test_detect_exhaustion_phrases() {
        assert_eq!(
            detect_exhaustion("Honestly I don’t know much about that area at all"),
            vec!["dont_know"]
        );
        assert_eq!(
            detect_exhaustion("I'm not sure, I haven't touched it in years"),
            vec!["not_sure", "havent"]
        );
        assert_eq!(detect_exhaustion("No idea"), vec!["no_idea", "short_answer"]);
        assert!(detect_exhaustion("I built a large service with async Rust and tokio").is_empty());
    }

    #[test]
    fn test_assess_turn_derives_engagement() {
        let turn = Turn::new("q", words(60));
        let a = assess_turn(&turn);
        assert_eq!(a.engagement, EngagementLevel::High);
        assert!(a.engagement_derived);
        assert!(!a.exhausted);

        let a = assess_turn(&Turn::new("q", words(15)));
        assert_eq!(a.engagement, EngagementLevel::Medium);

        let a = assess_turn(&Turn::new("q", words(10)));
        assert_eq!(a.engagement, EngagementLevel::Low);

        let a = assess_turn(&Turn::new("q", "I don't know, sorry about that one really"));
        assert_eq!(a.engagement, EngagementLevel::Low);
        assert!(a.exhausted);
    }

    #[test]
    fn test_assess_turn_trusts_signals() {
        let turn = Turn::new("q", "React, Jest").with_engagement(EngagementLevel::High);
        let a = assess_turn(&turn);
        assert_eq!(a.engagement, EngagementLevel::High);
        assert!(!a.engagement_derived);
        assert!(!a.exhausted);

        let turn = Turn::new("q", words(90))
            .with_engagement(EngagementLevel::Low)
            .with_exhaustion(["dont_know"]);
        let a = assess_turn(&turn);
        assert!(a.exhausted);
        assert_eq!(a.exhaustion_signals, vec!["dont_know"]);
    }

    #[test]
    fn test_grade_buckets() {
        let policy = InterviewGradingPolicy::default();
        assert!((policy.grade(&assessment(EngagementLevel::High, 80, false)) - 2.0).abs() < 1e-9);
        assert!((policy.grade(&assessment(EngagementLevel::High, 30, false)) - 1.5).abs() < 1e-9);
        assert!((policy.grade(&assessment(EngagementLevel::Medium, 8, false)) - 0.7).abs() < 1e-9);
        assert!((policy.grade(&assessment(EngagementLevel::Low, 0, false)) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_exhausted_scores_below_midpoint_and_base() {
        let policy = InterviewGradingPolicy::default();
        for engagement in [EngagementLevel::High, EngagementLevel::Medium, EngagementLevel::Low] {
            for count in [0, 10, 40, 200] {
                let fresh = policy.grade(&assessment(engagement, count, false));
                let tired = policy.grade(&assessment(engagement, count, true));
                assert!(tired < fresh);
                assert!(tired < 1.0);
            }
        }
    }

    #[test]
    fn test_fallback_score_shape() {
        assert!((fallback_score(0, 1) - 0.2).abs() < 1e-9);
        assert!((fallback_score(100, 1) - 2.0).abs() < 1e-9);
        assert!((fallback_score(500, 1) - 2.0).abs() < 1e-9);
        assert!((fallback_score(100, 3) - 2.0 / 1.2).abs() < 1e-9);
        assert!(fallback_score(50, 2) < fallback_score(50, 1));
        // depth 0 is treated as a root
        assert_eq!(fallback_score(10, 0), fallback_score(10, 1));
    }
}
