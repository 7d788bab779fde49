use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::SharedState;
use crate::engine::InterviewSummary;
use crate::error::{AppError, AppResult, McpError, McpResult};
use crate::session::MemoryStats;
use crate::tree::{
    node_status, render_tree, ConversationTree, EngagementLevel, TopicNode, TreeStats, Turn,
};

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        "interview_start" => handle_start(state, arguments).await,
        "interview_turn" => handle_turn(state, arguments).await,
        "interview_tree" => handle_tree(state, arguments).await,
        "interview_next_branch" => handle_next_branch(state, arguments).await,
        "interview_mark_visited" => handle_mark_visited(state, arguments).await,
        "interview_summary" => handle_summary(state, arguments).await,
        "interview_end" => handle_end(state, arguments).await,
        "interview_stats" => handle_stats(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

// ============================================================================
// Parameter and response types
// ============================================================================

/// Parameters for `interview_start`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartParams {
    /// Caller-chosen session ID; generated when absent.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Parameters naming a single session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionParams {
    pub session_id: String,
}

/// Parameters for `interview_turn`.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnParams {
    pub session_id: String,
    /// The interviewer's question.
    pub prompt: String,
    /// The candidate's answer.
    pub response: String,
    #[serde(default)]
    pub engagement: Option<EngagementLevel>,
    #[serde(default)]
    pub new_topics: Vec<String>,
    /// Exhaustion tags such as `dont_know`.
    #[serde(default)]
    pub exhaustion: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl TurnParams {
    /// Build the engine turn, stamped with the current time.
    pub fn into_turn(self) -> Turn {
        let mut turn = Turn::new(self.prompt, self.response)
            .with_new_topics(self.new_topics)
            .with_exhaustion(self.exhaustion);
        if let Some(engagement) = self.engagement {
            turn = turn.with_engagement(engagement);
        }
        if let Some(metadata) = self.metadata {
            turn = turn.with_metadata(metadata);
        }
        turn
    }
}

/// Parameters for `interview_mark_visited`.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkVisitedParams {
    pub session_id: String,
    pub node_id: String,
}

/// Parameters for `interview_stats`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsParams {
    /// Limit the report to one session.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Compact view of one topic for tool responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub id: String,
    pub label: String,
    pub parent_id: Option<String>,
    pub depth: usize,
    pub score: Option<f64>,
    pub status: &'static str,
    pub visit_count: u32,
    pub turn_count: usize,
}

impl From<&TopicNode> for NodeView {
    fn from(node: &TopicNode) -> Self {
        Self {
            id: node.id.clone(),
            label: node.label.clone(),
            parent_id: node.parent_id.clone(),
            depth: node.depth,
            score: node.score,
            status: node_status(node),
            visit_count: node.metadata.visit_count,
            turn_count: node.metadata.turns.len(),
        }
    }
}

/// Response for `interview_tree`.
#[derive(Debug, Clone, Serialize)]
pub struct TreeResponse {
    pub session_id: String,
    /// Nodes in pre-order.
    pub nodes: Vec<NodeView>,
    /// Node IDs from a root to the current topic.
    pub current_path: Vec<String>,
    pub max_depth_reached: usize,
    pub exhausted_topics: Vec<String>,
    pub rendered_tree_text: String,
}

impl From<&ConversationTree> for TreeResponse {
    fn from(tree: &ConversationTree) -> Self {
        Self {
            session_id: tree.session_id.clone(),
            nodes: tree.preorder().into_iter().map(NodeView::from).collect(),
            current_path: tree.current_path().to_vec(),
            max_depth_reached: tree.max_depth_reached,
            exhausted_topics: tree.exhausted_topics.clone(),
            rendered_tree_text: render_tree(tree),
        }
    }
}

/// Response for `interview_next_branch`.
#[derive(Debug, Clone, Serialize)]
pub struct NextBranchResponse {
    pub session_id: String,
    /// `None` once every topic has been explored.
    pub node: Option<NodeView>,
}

/// Response for `interview_end`.
#[derive(Debug, Clone, Serialize)]
pub struct EndResponse {
    pub ended: bool,
    pub summary: InterviewSummary,
}

/// Response for `interview_stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub memory: MemoryStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<TreeStats>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_start(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    // Every start parameter is optional.
    let arguments = arguments.or_else(|| Some(Value::Object(Default::default())));
    execute_handler("interview_start", arguments, |params: StartParams| {
        state.engine.create_session(params.session_id, params.metadata)
    })
    .await
}

async fn handle_turn(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("interview_turn", arguments, |params: TurnParams| async move {
        let session_id = params.session_id.clone();
        state
            .engine
            .process_turn(&session_id, params.into_turn())
            .await
    })
    .await
}

async fn handle_tree(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("interview_tree", arguments, |params: SessionParams| async move {
        state
            .engine
            .get_tree(&params.session_id)
            .await
            .map(|tree| TreeResponse::from(&tree))
    })
    .await
}

async fn handle_next_branch(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("interview_next_branch", arguments, |params: SessionParams| async move {
        let node = state
            .engine
            .get_deepest_unvisited_branch(&params.session_id)
            .await?;
        Ok::<_, AppError>(NextBranchResponse {
            session_id: params.session_id,
            node: node.as_ref().map(NodeView::from),
        })
    })
    .await
}

async fn handle_mark_visited(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "interview_mark_visited",
        arguments,
        |params: MarkVisitedParams| async move {
            state
                .engine
                .mark_visited(&params.session_id, &params.node_id)
                .await
                .map(|node| NodeView::from(&node))
        },
    )
    .await
}

async fn handle_summary(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("interview_summary", arguments, |params: SessionParams| async move {
        state.engine.get_summary(&params.session_id).await
    })
    .await
}

async fn handle_end(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("interview_end", arguments, |params: SessionParams| async move {
        state
            .engine
            .end_session(&params.session_id)
            .await
            .map(|summary| EndResponse {
                ended: true,
                summary,
            })
    })
    .await
}

async fn handle_stats(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let arguments = arguments.or_else(|| Some(Value::Object(Default::default())));
    execute_handler("interview_stats", arguments, |params: StatsParams| async move {
        let tree = match params.session_id {
            Some(id) => Some(state.engine.stats(&id).await?),
            None => None,
        };
        Ok::<_, AppError>(StatsResponse {
            memory: state.engine.memory_stats().await,
            tree,
        })
    })
    .await
}

// ============================================================================
// Helper functions
// ============================================================================

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Generic handler that runs an engine operation with consistent error handling.
///
/// Parses typed parameters and serializes the result to JSON. Errors the
/// caller can fix (bad input, unknown session) become
/// [`McpError::InvalidParameters`]; anything else is
/// [`McpError::ExecutionFailed`].
async fn execute_handler<P, R, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = AppResult<R>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;

    let result = operation(params).await.map_err(|e| {
        if e.is_caller_correctable() {
            McpError::InvalidParameters {
                tool_name: tool_name.to_string(),
                message: e.to_string(),
            }
        } else {
            McpError::ExecutionFailed {
                message: e.to_string(),
            }
        }
    })?;

    serde_json::to_value(result).map_err(McpError::Json)
}
