use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Langbase credentials. `None` runs the engine on its in-process analyzer and grader.
    pub langbase: Option<LangbaseConfig>,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: PipeConfig,
    pub tree: TreeLimits,
    pub capabilities: CapabilityConfig,
    pub session: SessionConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Langbase pipe name configuration
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub topic_extraction: String,
    pub topic_relationship: String,
    pub turn_scoring: String,
}

/// Structural ceilings and attachment tuning for a topic tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeLimits {
    pub max_depth: usize,
    pub max_nodes: usize,
    /// Relationship proposals below this confidence attach to the current node instead.
    pub min_attach_confidence: f64,
}

/// Timeouts for the pluggable capabilities
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapabilityConfig {
    pub analysis_timeout_ms: u64,
    pub scoring_timeout_ms: u64,
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub max_age_secs: u64,
    pub cleanup_interval_secs: u64,
    /// Zero disables periodic auto-save.
    pub autosave_interval_secs: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = match env::var("LANGBASE_API_KEY") {
            Ok(api_key) if !api_key.trim().is_empty() => Some(LangbaseConfig {
                api_key,
                base_url: env::var("LANGBASE_BASE_URL")
                    .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
            }),
            _ => None,
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/interviews.db".to_string()),
            ),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_or("REQUEST_TIMEOUT_MS", 30000),
            max_retries: env_or("MAX_RETRIES", 3),
            retry_delay_ms: env_or("RETRY_DELAY_MS", 1000),
        };

        let pipes = PipeConfig {
            topic_extraction: env::var("PIPE_TOPIC_EXTRACTION")
                .unwrap_or_else(|_| "interview-topic-extraction-v1".to_string()),
            topic_relationship: env::var("PIPE_TOPIC_RELATIONSHIP")
                .unwrap_or_else(|_| "interview-topic-relationship-v1".to_string()),
            turn_scoring: env::var("PIPE_TURN_SCORING")
                .unwrap_or_else(|_| "interview-turn-scoring-v1".to_string()),
        };

        let defaults = TreeLimits::default();
        let tree = TreeLimits {
            max_depth: env_or("TREE_MAX_DEPTH", defaults.max_depth),
            max_nodes: env_or("TREE_MAX_NODES", defaults.max_nodes),
            min_attach_confidence: env_or(
                "MIN_ATTACH_CONFIDENCE",
                defaults.min_attach_confidence,
            ),
        };
        if tree.max_depth == 0 || tree.max_nodes == 0 {
            return Err(AppError::Config {
                message: "TREE_MAX_DEPTH and TREE_MAX_NODES must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&tree.min_attach_confidence) {
            return Err(AppError::Config {
                message: "MIN_ATTACH_CONFIDENCE must be between 0.0 and 1.0".to_string(),
            });
        }

        let capabilities = CapabilityConfig {
            analysis_timeout_ms: env_or("ANALYSIS_TIMEOUT_MS", 8000),
            scoring_timeout_ms: env_or("SCORING_TIMEOUT_MS", 8000),
        };

        let session = SessionConfig {
            max_age_secs: env_or("SESSION_MAX_AGE_SECS", 7200),
            cleanup_interval_secs: env_or("SESSION_CLEANUP_INTERVAL_SECS", 300),
            autosave_interval_secs: env_or("SESSION_AUTOSAVE_INTERVAL_SECS", 60),
        };
        if session.cleanup_interval_secs == 0 {
            return Err(AppError::Config {
                message: "SESSION_CLEANUP_INTERVAL_SECS must be positive".to_string(),
            });
        }

        Ok(Config {
            langbase,
            database,
            logging,
            request,
            pipes,
            tree,
            capabilities,
            session,
        })
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            topic_extraction: "interview-topic-extraction-v1".to_string(),
            topic_relationship: "interview-topic-relationship-v1".to_string(),
            turn_scoring: "interview-turn-scoring-v1".to_string(),
        }
    }
}

impl Default for TreeLimits {
    fn default() -> Self {
        Self {
            max_depth: 50,
            max_nodes: 10_000,
            min_attach_confidence: 0.5,
        }
    }
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            analysis_timeout_ms: 8000,
            scoring_timeout_ms: 8000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 7200,
            cleanup_interval_secs: 300,
            autosave_interval_secs: 60,
        }
    }
}
