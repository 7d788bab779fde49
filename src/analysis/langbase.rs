use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{Relationship, RelationshipContext, RelationshipKind, TopicAnalyzer};
use crate::config::PipeConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::langbase::{
    parse_completion, LangbaseClient, Message, PipeRequest, RelationshipResponse,
    TopicExtractionResponse,
};
use crate::prompts::{TOPIC_EXTRACTION_PROMPT, TOPIC_RELATIONSHIP_PROMPT};
use crate::tree::Turn;

/// Upper bound on topics listed in a relationship request.
const MAX_CONTEXT_TOPICS: usize = 200;

/// Topic analyzer backed by two Langbase pipes.
pub struct LangbaseTopicAnalyzer {
    langbase: LangbaseClient,
    extraction_pipe: String,
    relationship_pipe: String,
}

impl LangbaseTopicAnalyzer {
    /// Create an analyzer using the configured pipe names
    pub fn new(langbase: LangbaseClient, pipes: &PipeConfig) -> Self {
        Self {
            langbase,
            extraction_pipe: pipes.topic_extraction.clone(),
            relationship_pipe: pipes.topic_relationship.clone(),
        }
    }

    fn build_extraction_messages(turn: &Turn) -> Vec<Message> {
        let mut user = format!("Question: {}\nAnswer: {}", turn.prompt, turn.response);
        if !turn.signals.new_topics.is_empty() {
            user.push_str(&format!(
                "\nTopics flagged by the interviewer: {}",
                turn.signals.new_topics.join(", ")
            ));
        }
        vec![Message::system(TOPIC_EXTRACTION_PROMPT), Message::user(user)]
    }

    fn build_relationship_messages(candidate: &str, context: &RelationshipContext) -> Vec<Message> {
        let topics: Vec<_> = context.topics.iter().take(MAX_CONTEXT_TOPICS).collect();
        let payload = json!({
            "candidate": candidate,
            "current": context.current,
            "topics": topics,
        });
        vec![
            Message::system(TOPIC_RELATIONSHIP_PROMPT),
            Message::user(payload.to_string()),
        ]
    }
}

#[async_trait]
impl TopicAnalyzer for LangbaseTopicAnalyzer {
    async fn extract_topics(&self, turn: &Turn) -> AnalysisResult<Vec<String>> {
        let start = Instant::now();
        let request =
            PipeRequest::new(&self.extraction_pipe, Self::build_extraction_messages(turn));
        let response = self.langbase.call_pipe(request).await?;

        let parsed: TopicExtractionResponse =
            parse_completion(&response.completion).map_err(|message| {
                warn!(
                    pipe = %self.extraction_pipe,
                    error = %message,
                    "Failed to parse topic extraction"
                );
                AnalysisError::InvalidOutput { message }
            })?;

        info!(
            pipe = %self.extraction_pipe,
            topics = parsed.topics.len(),
            latency_ms = start.elapsed().as_millis(),
            "Topics extracted"
        );
        Ok(parsed.topics)
    }

    async fn determine_relationship(
        &self,
        candidate: &str,
        context: &RelationshipContext,
    ) -> AnalysisResult<Relationship> {
        let request = PipeRequest::new(
            &self.relationship_pipe,
            Self::build_relationship_messages(candidate, context),
        );
        let response = self.langbase.call_pipe(request).await?;

        let parsed: RelationshipResponse = parse_completion(&response.completion)
            .map_err(|message| AnalysisError::InvalidOutput { message })?;
        let kind: RelationshipKind = parsed
            .relationship
            .parse()
            .map_err(|message| AnalysisError::InvalidOutput { message })?;

        debug!(
            pipe = %self.relationship_pipe,
            candidate = %candidate,
            kind = %kind,
            "Relationship classified"
        );
        Ok(Relationship {
            kind,
            anchor_node_id: parsed.node_id.filter(|_| kind != RelationshipKind::NewRoot),
            confidence: parsed.confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::TopicRef;

    #[test]
    fn test_extraction_messages_include_flagged_topics() {
        let turn = Turn::new("What about testing?", "I use Jest").with_new_topics(["Jest"]);
        let messages = LangbaseTopicAnalyzer::build_extraction_messages(&turn);
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("Question: What about testing?"));
        assert!(messages[1].content.contains("flagged by the interviewer: Jest"));
    }

    #[test]
    fn test_relationship_messages_are_json() {
        let context = RelationshipContext {
            current: Some(TopicRef::new("n1", "React", 2)),
            topics: vec![TopicRef::new("n1", "React", 2)],
            ..Default::default()
        };
        let messages = LangbaseTopicAnalyzer::build_relationship_messages("Hooks", &context);
        let payload: serde_json::Value = serde_json::from_str(&messages[1].content).unwrap();
        assert_eq!(payload["candidate"], "Hooks");
        assert_eq!(payload["current"]["id"], "n1");
        assert_eq!(payload["topics"][0]["label"], "React");
    }
}
