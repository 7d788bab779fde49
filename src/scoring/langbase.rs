use std::time::Instant;

use async_trait::async_trait;
use tracing::info;

use super::{ScoringContext, ScoringStrategy};
use crate::config::PipeConfig;
use crate::error::{ScoringError, ScoringResult};
use crate::langbase::{parse_completion, LangbaseClient, Message, PipeRequest, TurnScoreResponse};
use crate::prompts::TURN_SCORING_PROMPT;
use crate::tree::Turn;

/// Earlier turns included in the scoring request.
const HISTORY_WINDOW: usize = 5;

/// Scoring strategy backed by a Langbase pipe returning `{"score": x}`.
pub struct LangbaseScoringStrategy {
    langbase: LangbaseClient,
    pipe_name: String,
}

impl LangbaseScoringStrategy {
    pub fn new(langbase: LangbaseClient, pipes: &PipeConfig) -> Self {
        Self {
            langbase,
            pipe_name: pipes.turn_scoring.clone(),
        }
    }

    fn build_messages(turn: &Turn, context: &ScoringContext) -> Vec<Message> {
        let mut user = format!(
            "Topic: {}\nDepth: {}\nEngagement: {}\n",
            context.topic, context.depth, context.assessment.engagement
        );
        if context.assessment.exhausted {
            user.push_str(&format!(
                "Exhaustion signals: {}\n",
                context.assessment.exhaustion_signals.join(", ")
            ));
        }

        let skip = context.history.len().saturating_sub(HISTORY_WINDOW);
        let recent: Vec<_> = context.history.iter().skip(skip).collect();
        if !recent.is_empty() {
            user.push_str("\nEarlier exchanges:\n");
            for earlier in recent {
                user.push_str(&format!("Q: {}\nA: {}\n", earlier.prompt, earlier.response));
            }
        }

        user.push_str(&format!(
            "\nQuestion: {}\nAnswer: {}",
            turn.prompt, turn.response
        ));
        vec![Message::system(TURN_SCORING_PROMPT), Message::user(user)]
    }
}

#[async_trait]
impl ScoringStrategy for LangbaseScoringStrategy {
    async fn calculate_score(&self, turn: &Turn, context: &ScoringContext) -> ScoringResult<f64> {
        let start = Instant::now();
        let request = PipeRequest::new(&self.pipe_name, Self::build_messages(turn, context));
        let response = self.langbase.call_pipe(request).await?;

        let parsed: TurnScoreResponse = parse_completion(&response.completion)
            .map_err(|message| ScoringError::InvalidOutput { message })?;

        info!(
            pipe = %self.pipe_name,
            score = parsed.score,
            latency_ms = start.elapsed().as_millis(),
            "Turn scored by pipe"
        );
        Ok(parsed.score)
    }
}
