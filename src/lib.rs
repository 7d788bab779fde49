//! # Interview Topic Tree
//!
//! An adaptive interview engine. Each question/answer turn is mapped onto a
//! growing tree of topics, graded, and used to decide where the interview
//! goes next: keep probing the current topic, descend into sub-topics the
//! candidate raised, or backtrack out of an exhausted one.
//!
//! Topic extraction and scoring are pluggable. Both run in-process by default
//! and can be backed by Langbase pipes; a capability that fails or times out
//! degrades to a deterministic fallback instead of failing the turn.
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → McpServer → InterviewEngine → GradingOrchestrator → TreeManager
//!                               ↓                    ↓
//!                        SessionManager      TopicAnalyzer / ScoringStrategy
//!                               ↓                    ↓
//!                        SQLite (sessions)    keyword + policy | Langbase pipes
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use interview_topic_tree::config::{CapabilityConfig, TreeLimits};
//! use interview_topic_tree::engine::InterviewEngine;
//! use interview_topic_tree::tree::{EngagementLevel, Turn};
//!
//! # async fn run() -> interview_topic_tree::AppResult<()> {
//! let engine = InterviewEngine::with_defaults(TreeLimits::default(), CapabilityConfig::default());
//! let session = engine.create_session(None, None).await?;
//!
//! let outcome = engine
//!     .process_turn(
//!         &session.id,
//!         Turn::new("What have you built with Rust?", "A tokio service with sqlx and tracing")
//!             .with_engagement(EngagementLevel::High),
//!     )
//!     .await?;
//! println!("now on {} ({:?})", outcome.cursor_topic.unwrap_or_default(), outcome.navigation);
//!
//! let summary = engine.end_session(&session.id).await?;
//! print!("{}", summary.rendered_tree_text);
//! # Ok(())
//! # }
//! ```

/// Topic extraction and relationship classification.
pub mod analysis;
/// Timeout-and-fallback wrapper shared by the pluggable capabilities.
pub mod capability;
/// Configuration loaded from the environment.
pub mod config;
/// Public engine API and interview summaries.
pub mod engine;
/// Error types and result aliases for the application.
pub mod error;
/// Langbase API client and types for pipe communication.
pub mod langbase;
/// Per-turn grading state machine and navigation.
pub mod orchestrator;
/// System prompts for Langbase pipes.
pub mod prompts;
/// Turn scoring strategies and the default grading policy.
pub mod scoring;
/// MCP server implementation and request handling.
pub mod server;
/// Session registry, expiry and persistence.
pub mod session;
/// Session persistence backends.
pub mod storage;
/// Topic tree data model and validated operations.
pub mod tree;
/// Input validation.
pub mod validation;

pub use config::Config;
pub use engine::{InterviewEngine, InterviewSummary};
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
pub use tree::{ConversationTree, TopicNode, Turn};
