//! Unit tests for MCP protocol implementation.
//!
//! Tests JSON-RPC 2.0 request/response handling, tool definitions,
//! and request dispatch against an in-process engine.

use super::*;
use crate::server::test_support::create_test_state;
use serde_json::json;
use std::collections::HashSet;

fn server() -> McpServer {
    McpServer::new(create_test_state())
}

fn request(id: Option<Value>, method: &str, params: Option<Value>) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id,
        method: method.to_string(),
        params,
    }
}

/// Text payload of a tools/call response, with its error flag.
fn tool_text(response: &JsonRpcResponse) -> (String, bool) {
    let result = response.result.as_ref().unwrap();
    let text = result["content"][0]["text"].as_str().unwrap().to_string();
    let is_error = result.get("isError").and_then(Value::as_bool).unwrap_or(false);
    (text, is_error)
}

// ============================================================================
// JsonRpcResponse tests
// ============================================================================

#[test]
fn test_jsonrpc_response_success_with_id() {
    let response = JsonRpcResponse::success(Some(json!(1)), json!({"result": "ok"}));

    assert_eq!(response.jsonrpc, "2.0");
    assert_eq!(response.id, json!(1));
    assert!(response.error.is_none());
    assert_eq!(response.result.unwrap()["result"], "ok");
}

#[test]
fn test_jsonrpc_response_success_without_id() {
    let response = JsonRpcResponse::success(None, json!({"data": "value"}));
    assert_eq!(response.id, Value::Null);
}

#[test]
fn test_jsonrpc_response_error_with_id() {
    let response = JsonRpcResponse::error(Some(json!(42)), -32600, "Invalid request");

    assert!(response.result.is_none());
    let error = response.error.unwrap();
    assert_eq!(error.code, -32600);
    assert_eq!(error.message, "Invalid request");
}

#[test]
fn test_jsonrpc_response_serialization() {
    let response = JsonRpcResponse::success(Some(json!(1)), json!({"test": true}));
    let serialized = serde_json::to_string(&response).unwrap();

    assert!(serialized.contains("\"jsonrpc\":\"2.0\""));
    assert!(serialized.contains("\"id\":1"));
    assert!(!serialized.contains("\"error\""));
}

// ============================================================================
// Request parsing tests
// ============================================================================

#[test]
fn test_jsonrpc_request_deserialization() {
    let req: JsonRpcRequest = serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "tools/call",
        "params": {"name": "interview_tree", "arguments": {"session_id": "s1"}}
    }))
    .unwrap();

    assert_eq!(req.id, Some(json!(7)));
    assert_eq!(req.method, "tools/call");
    let params: ToolCallParams = serde_json::from_value(req.params.unwrap()).unwrap();
    assert_eq!(params.name, "interview_tree");
    assert_eq!(params.arguments.unwrap()["session_id"], "s1");
}

#[test]
fn test_jsonrpc_notification_no_id() {
    let req: JsonRpcRequest =
        serde_json::from_str(r#"{"jsonrpc":"2.0","method":"initialized"}"#).unwrap();
    assert!(req.id.is_none());
    assert!(req.params.is_none());
}

#[test]
fn test_jsonrpc_request_missing_method_field() {
    let result = serde_json::from_str::<JsonRpcRequest>(r#"{"jsonrpc":"2.0","id":1}"#);
    assert!(result.is_err());
}

// ============================================================================
// Tool definition tests
// ============================================================================

#[test]
fn test_tool_names_are_unique_and_prefixed() {
    let tools = tool_definitions();
    assert_eq!(tools.len(), 8);

    let names: HashSet<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names.len(), tools.len());
    assert!(names.iter().all(|n| n.starts_with("interview_")));
}

#[test]
fn test_all_tools_have_object_schemas() {
    for tool in tool_definitions() {
        assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
        assert!(tool.input_schema["properties"].is_object(), "{}", tool.name);
        assert_eq!(tool.input_schema["additionalProperties"], false, "{}", tool.name);
        assert!(!tool.description.is_empty());
    }
}

#[test]
fn test_turn_tool_requires_text() {
    let tool = tool_definitions()
        .into_iter()
        .find(|t| t.name == "interview_turn")
        .unwrap();
    assert_eq!(
        tool.input_schema["required"],
        json!(["session_id", "prompt", "response"])
    );
    assert_eq!(
        tool.input_schema["properties"]["engagement"]["enum"],
        json!(["high", "medium", "low"])
    );
}

#[test]
fn test_tool_serialization_field_names() {
    let serialized = serde_json::to_value(&tool_definitions()[0]).unwrap();
    assert!(serialized.get("inputSchema").is_some());
    assert!(serialized.get("input_schema").is_none());
}

#[test]
fn test_tool_call_result_with_error() {
    let result = ToolCallResult {
        content: vec![ToolResultContent {
            content_type: "text".to_string(),
            text: "Error: boom".to_string(),
        }],
        is_error: Some(true),
    };
    let value = serde_json::to_value(result).unwrap();
    assert_eq!(value["isError"], true);
    assert_eq!(value["content"][0]["type"], "text");
}

// ============================================================================
// Dispatch tests
// ============================================================================

#[tokio::test]
async fn test_initialize_reports_server_info() {
    let response = server()
        .handle_request(request(Some(json!(1)), "initialize", None))
        .await
        .unwrap();
    let result = response.result.unwrap();

    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "interview-topic-tree");
    assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let server = server();
    assert!(server
        .handle_request(request(None, "initialized", None))
        .await
        .is_none());
    assert!(server
        .handle_request(request(None, "notifications/whatever", None))
        .await
        .is_none());
}

#[tokio::test]
async fn test_unknown_method() {
    let response = server()
        .handle_request(request(Some(json!(3)), "resources/list", None))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, -32601);
}

#[tokio::test]
async fn test_ping_and_tools_list() {
    let server = server();
    let pong = server
        .handle_request(request(Some(json!(1)), "ping", None))
        .await
        .unwrap();
    assert_eq!(pong.result.unwrap(), json!({}));

    let list = server
        .handle_request(request(Some(json!(2)), "tools/list", None))
        .await
        .unwrap();
    assert_eq!(list.result.unwrap()["tools"].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn test_tool_call_missing_params() {
    let response = server()
        .handle_request(request(Some(json!(1)), "tools/call", None))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, -32602);
}

#[tokio::test]
async fn test_tool_call_round_trip() {
    let server = server();
    let start = server
        .handle_request(request(
            Some(json!(1)),
            "tools/call",
            Some(json!({"name": "interview_start", "arguments": {"session_id": "mcp-1"}})),
        ))
        .await
        .unwrap();
    let (text, is_error) = tool_text(&start);
    assert!(!is_error);
    let info: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(info["id"], "mcp-1");

    let turn = server
        .handle_request(request(
            Some(json!(2)),
            "tools/call",
            Some(json!({
                "name": "interview_turn",
                "arguments": {
                    "session_id": "mcp-1",
                    "prompt": "How do you test async code?",
                    "response": "tokio::test with paused time and mockall for traits"
                }
            })),
        ))
        .await
        .unwrap();
    let (text, is_error) = tool_text(&turn);
    assert!(!is_error, "{text}");
    let outcome: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(outcome["depth"], 1);
    assert_eq!(outcome["is_new_branch"], true);
}

#[tokio::test]
async fn test_caller_errors_are_invalid_params() {
    let response = server()
        .handle_request(request(
            Some(json!(1)),
            "tools/call",
            Some(json!({"name": "interview_summary", "arguments": {"session_id": "ghost"}})),
        ))
        .await
        .unwrap();

    assert!(response.result.is_none());
    let error = response.error.unwrap();
    assert_eq!(error.code, -32602);
    assert!(error.message.contains("ghost"));

    let response = server()
        .handle_request(request(
            Some(json!(2)),
            "tools/call",
            Some(json!({"name": "interview_rewind", "arguments": {}})),
        ))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, -32602);
}

#[tokio::test]
async fn test_execution_failures_are_flagged_tool_results() {
    let server = server();
    server
        .handle_request(request(
            Some(json!(1)),
            "tools/call",
            Some(json!({"name": "interview_start", "arguments": {"session_id": "mcp-2"}})),
        ))
        .await
        .unwrap();

    let response = server
        .handle_request(request(
            Some(json!(2)),
            "tools/call",
            Some(json!({
                "name": "interview_mark_visited",
                "arguments": {"session_id": "mcp-2", "node_id": "no-such-node"}
            })),
        ))
        .await
        .unwrap();

    assert!(response.error.is_none());
    let (text, is_error) = tool_text(&response);
    assert!(is_error);
    assert!(text.starts_with("Error:"));
    assert!(text.contains("no-such-node"));
}
