//! Turn scoring capability.
//!
//! A [`ScoringStrategy`] turns a turn plus its context into a score in
//! [0.0, 2.0]. The [`ScoringEngine`] dispatches to the injected strategy under
//! a deadline and replaces failures, timeouts and out-of-range values with
//! [`fallback_score`].

mod langbase;
mod policy;

pub use langbase::LangbaseScoringStrategy;
pub use policy::{
    assess_turn, detect_exhaustion, engagement_from_length, fallback_score,
    InterviewGradingPolicy, TurnAssessment, SHORT_ANSWER_WORDS,
};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::capability::{call_with_timeout, Guarded};
use crate::error::{ScoringError, ScoringResult};
use crate::tree::Turn;
use crate::validation::validate_score;

/// Everything a strategy may use to score a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringContext {
    /// Label of the topic the turn lands on.
    pub topic: String,
    /// Depth the turn lands at (1 for a root).
    pub depth: usize,
    /// Every earlier turn in the tree, oldest first.
    pub history: Vec<Turn>,
    pub assessment: TurnAssessment,
}

/// Pluggable turn scoring.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScoringStrategy: Send + Sync {
    /// Score a turn; must return a finite value in [0.0, 2.0].
    async fn calculate_score(&self, turn: &Turn, context: &ScoringContext) -> ScoringResult<f64>;
}

/// A [`ScoringStrategy`] behind a deadline, range check and fallback.
#[derive(Clone)]
pub struct ScoringEngine {
    strategy: Arc<dyn ScoringStrategy>,
    timeout: Duration,
}

impl ScoringEngine {
    pub fn new(strategy: Arc<dyn ScoringStrategy>, timeout: Duration) -> Self {
        Self { strategy, timeout }
    }

    /// Score a turn; never fails.
    pub async fn score(&self, turn: &Turn, context: &ScoringContext) -> Guarded<f64> {
        let result = call_with_timeout(
            self.timeout,
            self.strategy.calculate_score(turn, context),
            |timeout_ms| ScoringError::Timeout { timeout_ms },
        )
        .await
        .and_then(|score| validate_score(score).map_err(|_| ScoringError::OutOfRange { score }));

        match result {
            Ok(score) => {
                debug!(topic = %context.topic, depth = context.depth, score, "Turn scored");
                Guarded::ok(score)
            }
            Err(e) => {
                let score = fallback_score(context.assessment.word_count, context.depth);
                warn!(
                    topic = %context.topic,
                    error = %e,
                    fallback_score = score,
                    "Scoring failed, using length heuristic"
                );
                Guarded::fallback(score, format!("scoring: {}", e))
            }
        }
    }
}
