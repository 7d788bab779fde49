//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers routing to the interview engine
//! - Shared application state

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::config::Config;
use crate::engine::InterviewEngine;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// The interview engine every tool delegates to.
    pub engine: Arc<InterviewEngine>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, engine: Arc<InterviewEngine>) -> Self {
        tracing::info!(
            langbase = config.langbase.is_some(),
            max_depth = config.tree.max_depth,
            max_nodes = config.tree.max_nodes,
            "AppState initializing"
        );
        Self { config, engine }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
