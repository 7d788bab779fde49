use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use interview_topic_tree::{
    config::{Config, LogFormat},
    engine::{summarize, InterviewEngine},
    orchestrator::GradingOrchestrator,
    server::{AppState, McpServer},
    session::SessionManager,
    storage::{SessionStore, SqliteStorage},
};

#[derive(Debug, Parser)]
#[command(name = "interview-topic-tree", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the MCP server over stdio (default)
    Serve,
    /// List persisted sessions, most recent first
    Sessions,
    /// Print the rendered tree and summary of a persisted session
    Show {
        /// Session ID
        id: String,
    },
    /// Delete a persisted session snapshot
    Forget {
        /// Session ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            Arc::new(s)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, storage).await,
        Command::Sessions => {
            for id in storage.list_ids().await? {
                println!("{id}");
            }
            Ok(())
        }
        Command::Show { id } => {
            let sessions = SessionManager::new(config.tree).with_store(storage);
            sessions.load_session(&id).await?;
            let summary = summarize(&sessions.get_session_tree(&id).await?);
            print!("{}", summary.rendered_tree_text);
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Forget { id } => {
            SessionManager::new(config.tree)
                .with_store(storage)
                .forget_session(&id)
                .await?;
            println!("forgot {id}");
            Ok(())
        }
    }
}

async fn serve(config: Config, storage: Arc<SqliteStorage>) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Interview topic tree server starting..."
    );

    let sessions = Arc::new(SessionManager::new(config.tree).with_store(storage));
    let orchestrator = GradingOrchestrator::from_config(&config).await;
    let engine = Arc::new(InterviewEngine::new(sessions.clone(), orchestrator));

    let max_age = Duration::from_secs(config.session.max_age_secs);
    let cleanup = engine
        .clone()
        .spawn_cleanup(Duration::from_secs(config.session.cleanup_interval_secs), max_age);
    let autosave = (config.session.autosave_interval_secs > 0).then(|| {
        sessions
            .clone()
            .spawn_auto_save(Duration::from_secs(config.session.autosave_interval_secs))
    });

    // Create application state
    let state = Arc::new(AppState::new(config, engine));

    // Start MCP server
    let server = McpServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    let result = server.run().await;

    cleanup.abort();
    if let Some(task) = autosave {
        task.abort();
    }
    match sessions.save_dirty_sessions().await {
        Ok(saved) => info!(saved, "Flushed sessions on shutdown"),
        Err(e) => warn!(error = %e, "Failed to flush sessions on shutdown"),
    }

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
