//! Integration tests for the Langbase-backed capabilities
//!
//! Tests pipe-backed topic analysis and scoring using wiremock for
//! request/response mocking.

use std::sync::Arc;

use serde_json::json;
use wiremock::{
    matchers::{body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use interview_topic_tree::analysis::{
    LangbaseTopicAnalyzer, RelationshipContext, RelationshipKind, TopicAnalyzer, TopicRef,
};
use interview_topic_tree::config::{
    CapabilityConfig, LangbaseConfig, PipeConfig, RequestConfig, TreeLimits,
};
use interview_topic_tree::engine::InterviewEngine;
use interview_topic_tree::error::LangbaseError;
use interview_topic_tree::langbase::{LangbaseClient, Message, PipeRequest};
use interview_topic_tree::orchestrator::GradingOrchestrator;
use interview_topic_tree::scoring::{
    assess_turn, LangbaseScoringStrategy, ScoringContext, ScoringStrategy,
};
use interview_topic_tree::session::SessionManager;
use interview_topic_tree::tree::{EngagementLevel, Turn};

/// Create a test client pointing to mock server
fn create_test_client(base_url: &str, max_retries: u32) -> LangbaseClient {
    let config = LangbaseConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
    };

    let request_config = RequestConfig {
        timeout_ms: 5000,
        max_retries,
        retry_delay_ms: 10,
    };

    LangbaseClient::new(&config, request_config).expect("Failed to create client")
}

fn completion(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "completion": text,
        "threadId": null,
        "raw": null
    }))
}

#[cfg(test)]
mod client_tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_pipe_call() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .and(header("Authorization", "Bearer test-api-key"))
            .respond_with(completion("hello"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let response = client
            .call_pipe(PipeRequest::new("any-pipe", vec![Message::user("hi")]))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.completion, "hello");
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 2);
        let err = client
            .call_pipe(PipeRequest::new("any-pipe", vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LangbaseError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 3);
        let err = client
            .call_pipe(PipeRequest::new("any-pipe", vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LangbaseError::Api { status: 401, .. }));
    }
}

#[cfg(test)]
mod analyzer_tests {
    use super::*;

    #[tokio::test]
    async fn test_extract_topics_from_fenced_completion() {
        let mock_server = MockServer::start().await;
        let pipes = PipeConfig::default();

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .and(body_string_contains(pipes.topic_extraction.as_str()))
            .respond_with(completion("```json\n{\"topics\": [\"React\", \"Hooks\"]}\n```"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let analyzer = LangbaseTopicAnalyzer::new(create_test_client(&mock_server.uri(), 0), &pipes);
        let topics = analyzer
            .extract_topics(&Turn::new("Frontend?", "React hooks mostly"))
            .await
            .unwrap();
        assert_eq!(topics, vec!["React".to_string(), "Hooks".to_string()]);
    }

    #[tokio::test]
    async fn test_determine_relationship() {
        let mock_server = MockServer::start().await;
        let pipes = PipeConfig::default();

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .and(body_string_contains(pipes.topic_relationship.as_str()))
            .respond_with(completion(
                r#"{"relationship": "child_of", "node_id": "n1", "confidence": 0.8}"#,
            ))
            .mount(&mock_server)
            .await;

        let analyzer = LangbaseTopicAnalyzer::new(create_test_client(&mock_server.uri(), 0), &pipes);
        let context = RelationshipContext {
            current: Some(TopicRef::new("n1", "React", 1)),
            topics: vec![TopicRef::new("n1", "React", 1)],
            ..Default::default()
        };
        let relationship = analyzer.determine_relationship("Hooks", &context).await.unwrap();

        assert_eq!(relationship.kind, RelationshipKind::ChildOf);
        assert_eq!(relationship.anchor_node_id.as_deref(), Some("n1"));
        assert!((relationship.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unparseable_completion_is_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(completion("I think the topic is React."))
            .mount(&mock_server)
            .await;

        let analyzer = LangbaseTopicAnalyzer::new(
            create_test_client(&mock_server.uri(), 0),
            &PipeConfig::default(),
        );
        assert!(analyzer
            .extract_topics(&Turn::new("Frontend?", "React"))
            .await
            .is_err());
    }
}

#[cfg(test)]
mod scoring_tests {
    use super::*;

    #[tokio::test]
    async fn test_pipe_score() {
        let mock_server = MockServer::start().await;
        let pipes = PipeConfig::default();

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .and(body_string_contains(pipes.turn_scoring.as_str()))
            .respond_with(completion(r#"{"score": 1.4, "rationale": "specific and correct"}"#))
            .expect(1)
            .mount(&mock_server)
            .await;

        let strategy = LangbaseScoringStrategy::new(create_test_client(&mock_server.uri(), 0), &pipes);
        let turn = Turn::new("Explain MVCC", "Readers see snapshots, writers create new row versions");
        let context = ScoringContext {
            topic: "Postgres".to_string(),
            depth: 2,
            history: Vec::new(),
            assessment: assess_turn(&turn),
        };

        let score = strategy.calculate_score(&turn, &context).await.unwrap();
        assert!((score - 1.4).abs() < 1e-9);
    }
}

#[cfg(test)]
mod engine_tests {
    use super::*;

    fn langbase_engine(base_url: &str) -> InterviewEngine {
        let pipes = PipeConfig::default();
        let client = create_test_client(base_url, 0);
        InterviewEngine::new(
            Arc::new(SessionManager::new(TreeLimits::default())),
            GradingOrchestrator::new(
                Arc::new(LangbaseTopicAnalyzer::new(client.clone(), &pipes)),
                Arc::new(LangbaseScoringStrategy::new(client, &pipes)),
                CapabilityConfig {
                    analysis_timeout_ms: 2000,
                    scoring_timeout_ms: 2000,
                },
            ),
        )
    }

    #[tokio::test]
    async fn test_turn_graded_through_pipes() {
        let mock_server = MockServer::start().await;
        let pipes = PipeConfig::default();

        Mock::given(method("POST"))
            .and(body_string_contains(pipes.topic_extraction.as_str()))
            .respond_with(completion(r#"{"topics": ["Kafka"]}"#))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains(pipes.topic_relationship.as_str()))
            .respond_with(completion(r#"{"relationship": "new_root", "confidence": 0.95}"#))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains(pipes.turn_scoring.as_str()))
            .respond_with(completion(r#"{"score": 1.7}"#))
            .mount(&mock_server)
            .await;

        let engine = langbase_engine(&mock_server.uri());
        let session = engine.create_session(None, None).await.unwrap();
        let outcome = engine
            .process_turn(
                &session.id,
                Turn::new("Which brokers have you run?", "Kafka with exactly-once producers")
                    .with_engagement(EngagementLevel::Medium),
            )
            .await
            .unwrap();

        assert_eq!(outcome.topic, "Kafka");
        assert!((outcome.score - 1.7).abs() < 1e-9);
        assert!(!outcome.degraded);
    }

    #[tokio::test]
    async fn test_pipe_outage_degrades_instead_of_failing() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&mock_server)
            .await;

        let engine = langbase_engine(&mock_server.uri());
        let session = engine.create_session(None, None).await.unwrap();
        let outcome = engine
            .process_turn(
                &session.id,
                Turn::new("Which brokers have you run?", "Kafka and RabbitMQ"),
            )
            .await
            .unwrap();

        assert!(outcome.degraded);
        assert!(outcome.degradation_reasons.len() >= 2);
        assert!((0.0..=2.0).contains(&outcome.score));
        assert_eq!(engine.get_tree(&session.id).await.unwrap().len(), 1);
    }
}

#[cfg(test)]
mod startup_tests {
    use super::*;
    use interview_topic_tree::config::{
        Config, DatabaseConfig, LogFormat, LoggingConfig, SessionConfig,
    };
    use interview_topic_tree::tree::TreeManager;

    fn config_for(base_url: Option<&str>) -> Config {
        Config {
            langbase: base_url.map(|url| LangbaseConfig {
                api_key: "test-api-key".to_string(),
                base_url: url.to_string(),
            }),
            database: DatabaseConfig {
                path: ":memory:".into(),
                max_connections: 1,
            },
            logging: LoggingConfig {
                level: "warn".to_string(),
                format: LogFormat::Pretty,
            },
            request: RequestConfig {
                timeout_ms: 2000,
                max_retries: 0,
                retry_delay_ms: 10,
            },
            pipes: PipeConfig::default(),
            tree: TreeLimits::default(),
            capabilities: CapabilityConfig {
                analysis_timeout_ms: 2000,
                scoring_timeout_ms: 2000,
            },
            session: SessionConfig::default(),
        }
    }

    async fn grade_one_turn(orchestrator: &GradingOrchestrator) -> bool {
        let mut mgr = TreeManager::new("startup", TreeLimits::default());
        let outcome = orchestrator
            .process_turn(
                &mut mgr,
                Turn::new("Which brokers have you run?", "Kafka and RabbitMQ in production"),
            )
            .await
            .unwrap();
        outcome.degraded
    }

    #[tokio::test]
    async fn test_unreachable_pipes_fall_back_to_in_process() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&mock_server)
            .await;

        let orchestrator = GradingOrchestrator::from_config(&config_for(Some(&mock_server.uri()))).await;
        assert!(!grade_one_turn(&orchestrator).await);
    }

    #[tokio::test]
    async fn test_existing_pipes_enable_langbase_capabilities() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes"))
            .respond_with(ResponseTemplate::new(409).set_body_string("exists"))
            .expect(3)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let orchestrator = GradingOrchestrator::from_config(&config_for(Some(&mock_server.uri()))).await;
        assert!(grade_one_turn(&orchestrator).await);
    }

    #[tokio::test]
    async fn test_without_api_key_runs_in_process() {
        let orchestrator = GradingOrchestrator::from_config(&config_for(None)).await;
        assert!(!grade_one_turn(&orchestrator).await);
    }
}
