//! Mnemon server binary.
//!
//! Loads configuration, wires the stores and engines, ensures a default
//! agent exists, and serves the HTTP gateway.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mnemon_config::AppConfig;
use mnemon_core::agent::AgentConfig;
use mnemon_core::error::ProviderError;
use mnemon_core::event::EventBus;
use mnemon_core::provider::{Provider, ProviderRequest, ProviderResponse};
use mnemon_gateway::AppState;
use mnemon_memory::SqliteMemoryStore;
use mnemon_store::{ConversationStore, VersionStore};
use mnemon_telemetry::CostTracker;

const DEFAULT_AGENT_ID: &str = "default";

#[derive(Parser)]
#[command(name = "mnemon", about = "Stateful conversational agent server", version)]
struct Cli {
    /// Path to a TOML config file (environment variables override it).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP gateway (default).
    Serve,
}

/// Placeholder provider used until a real provider client is linked in.
/// The provider HTTP client is an external collaborator behind the
/// `Provider` trait; this stub keeps the rest of the server operational.
struct UnconfiguredProvider;

#[async_trait::async_trait]
impl Provider for UnconfiguredProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn complete(
        &self,
        _request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured(
            "no provider client linked; chat is unavailable".into(),
        ))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("mnemon: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(cli.config.as_deref())?;
    config.validate()?;

    std::fs::create_dir_all(&config.data_dir)?;
    info!(data_dir = %config.data_dir.display(), "Using deployment directory");

    let pool = mnemon_store::open_pool(&config.store_db_path()).await?;
    let event_bus = Arc::new(EventBus::default());
    let versions =
        Arc::new(VersionStore::new(pool.clone()).await?.with_event_bus(event_bus.clone()));
    let conversations = Arc::new(ConversationStore::new(pool).await?);
    let memory_store = Arc::new(SqliteMemoryStore::new(&config.memory_db_path()).await?);
    let tracker = Arc::new(CostTracker::new());

    // A fresh deployment gets one default agent to talk to.
    if versions.list_agents().await?.is_empty() {
        let agent_config = AgentConfig::initial(
            &config.default_model,
            "You are Mnemon, a thoughtful assistant with long-term memory. \
             Use your memory tools to remember what matters and end every turn \
             with send_message.",
        );
        versions.create_agent(DEFAULT_AGENT_ID, "Mnemon", agent_config).await?;
        info!(agent = DEFAULT_AGENT_ID, "Created default agent");
    }

    warn!("No provider client linked; chat endpoints will report provider_not_configured");
    let state = Arc::new(AppState::new(
        config,
        Arc::new(UnconfiguredProvider),
        versions,
        conversations,
        memory_store,
        tracker,
        event_bus,
    ));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => mnemon_gateway::serve(state).await,
    }
}
