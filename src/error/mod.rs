use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Tree integrity error: {0}")]
    Integrity(#[from] TreeIntegrityError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Langbase error: {0}")]
    Langbase(#[from] LangbaseError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Whether the caller can fix this error by correcting its input.
    pub fn is_caller_correctable(&self) -> bool {
        matches!(self, AppError::Validation(_) | AppError::Session(_))
    }
}

/// Bad input, rejected before any mutation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: String },

    #[error("{field} exceeds maximum length of {max} (got {actual})")]
    TooLong {
        field: String,
        max: usize,
        actual: usize,
    },

    #[error("{field} contains disallowed content: {reason}")]
    DisallowedContent { field: String, reason: String },

    #[error("{field} value {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} is malformed: {reason}")]
    Malformed { field: String, reason: String },
}

/// A mutation would violate, or did violate, a structural invariant of the tree
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeIntegrityError {
    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("Node already exists: {node_id}")]
    DuplicateNode { node_id: String },

    #[error("Node {node_id} cannot be its own parent")]
    SelfParent { node_id: String },

    #[error("Setting {parent_id} as parent of {node_id} would create a cycle")]
    CycleDetected { node_id: String, parent_id: String },

    #[error("Node {node_id} has depth {actual}, expected {expected}")]
    DepthMismatch {
        node_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Parent/child link mismatch between {parent_id} and {child_id}")]
    LinkMismatch { parent_id: String, child_id: String },

    #[error("Node {node_id} reached more than once during tree walk")]
    DuplicateVisit { node_id: String },

    #[error("Node {node_id} is not reachable from any root")]
    Unreachable { node_id: String },

    #[error("Invalid node {node_id}: {reason}")]
    InvalidNode { node_id: String, reason: String },

    #[error("Invalid current path: {reason}")]
    InvalidPath { reason: String },

    #[error("Depth {depth} exceeds maximum tree depth {max}")]
    DepthCeilingExceeded { depth: usize, max: usize },

    #[error("Node count {count} exceeds maximum tree size {max}")]
    SizeCeilingExceeded { count: usize, max: usize },
}

/// Topic analysis capability failures (always absorbed by a fallback)
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Topic analysis unavailable: {message}")]
    Unavailable { message: String },

    #[error("Topic analysis timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Invalid topic analysis output: {message}")]
    InvalidOutput { message: String },

    #[error("Langbase error: {0}")]
    Langbase(#[from] LangbaseError),
}

/// Scoring capability failures (always absorbed by a fallback)
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Scoring strategy failed: {message}")]
    StrategyFailed { message: String },

    #[error("Scoring timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Score {score} is outside the valid range")]
    OutOfRange { score: f64 },

    #[error("Invalid scoring output: {message}")]
    InvalidOutput { message: String },

    #[error("Langbase error: {0}")]
    Langbase(#[from] LangbaseError),
}

/// Session registry errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("Session not found: {session_id}")]
    NotFound { session_id: String },

    #[error("Session already exists: {session_id}")]
    AlreadyExists { session_id: String },

    #[error("No session store configured")]
    NoStore,
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Snapshot encoding failed: {message}")]
    Encoding { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Langbase API errors
#[derive(Debug, Error)]
pub enum LangbaseError {
    #[error("Langbase unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for Langbase operations
pub type LangbaseResult<T> = Result<T, LangbaseError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// Result type alias for topic analysis
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Result type alias for scoring
pub type ScoringResult<T> = Result<T, ScoringError>;

/// Result type alias for validation checks
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type alias for tree integrity checks
pub type IntegrityResult<T> = Result<T, TreeIntegrityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::Empty {
            field: "prompt".to_string(),
        };
        assert_eq!(err.to_string(), "prompt cannot be empty");

        let err = ValidationError::TooLong {
            field: "response".to_string(),
            max: 10,
            actual: 12,
        };
        assert_eq!(
            err.to_string(),
            "response exceeds maximum length of 10 (got 12)"
        );

        let err = ValidationError::OutOfRange {
            field: "score".to_string(),
            value: 3.0,
            min: 0.0,
            max: 2.0,
        };
        assert_eq!(err.to_string(), "score value 3 is outside [0, 2]");
    }

    #[test]
    fn test_integrity_error_display() {
        let err = TreeIntegrityError::CycleDetected {
            node_id: "a".to_string(),
            parent_id: "b".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Setting b as parent of a would create a cycle"
        );

        let err = TreeIntegrityError::SizeCeilingExceeded {
            count: 11,
            max: 10,
        };
        assert_eq!(err.to_string(), "Node count 11 exceeds maximum tree size 10");
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::NotFound {
            session_id: "sess-123".to_string(),
        };
        assert_eq!(err.to_string(), "Session not found: sess-123");

        let err = SessionError::AlreadyExists {
            session_id: "sess-123".to_string(),
        };
        assert_eq!(err.to_string(), "Session already exists: sess-123");
    }

    #[test]
    fn test_capability_error_display() {
        let err = AnalysisError::Timeout { timeout_ms: 250 };
        assert_eq!(err.to_string(), "Topic analysis timed out after 250ms");

        let err = ScoringError::OutOfRange { score: 4.5 };
        assert_eq!(err.to_string(), "Score 4.5 is outside the valid range");
    }

    #[test]
    fn test_langbase_error_display() {
        let err = LangbaseError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(err.to_string(), "Langbase unavailable: server down (retries: 3)");

        let err = LangbaseError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = LangbaseError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_conversions_into_app_error() {
        let err: AppError = ValidationError::Empty {
            field: "prompt".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.is_caller_correctable());

        let err: AppError = TreeIntegrityError::NodeNotFound {
            node_id: "n".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Integrity(_)));
        assert!(!err.is_caller_correctable());

        let err: AppError = SessionError::NotFound {
            session_id: "s".to_string(),
        }
        .into();
        assert!(err.is_caller_correctable());

        let err: AppError = StorageError::SessionNotFound {
            session_id: "s".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Storage(_)));
    }

    #[test]
    fn test_app_error_conversion_to_mcp_error() {
        let app_err = AppError::Config {
            message: "test error".to_string(),
        };
        let mcp_err: McpError = app_err.into();
        assert!(matches!(mcp_err, McpError::ExecutionFailed { .. }));
        assert!(mcp_err.to_string().contains("Configuration error"));
    }
}
